//! Domain logic for field slot reservations.
//!
//! This crate has no internal dependencies so it can be used by the
//! repository layer, the API server and any future tooling alike. Every
//! time-dependent rule takes an explicit `now`.

pub mod booking_limits;
pub mod booking_state;
pub mod error;
pub mod hashing;
pub mod idempotency;
pub mod payment_signature;
pub mod roles;
pub mod slot_lock;
pub mod slot_schedule;
pub mod status;
pub mod types;
