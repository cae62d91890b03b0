//! Caller identity.
//!
//! Tokens are issued by an external identity service; this crate only
//! verifies them. See [`jwt`] for the claims layout.

pub mod jwt;
