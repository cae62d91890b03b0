//! Authentication and authorization extractors.
//!
//! - [`auth::AuthUser`] -- Extracts the caller from a JWT Bearer token.
//! - [`rbac::RequireAdmin`] -- Requires the `admin` role.
//! - [`cron::CronAuth`] -- Authenticates scheduled sweep triggers.

pub mod auth;
pub mod cron;
pub mod rbac;
