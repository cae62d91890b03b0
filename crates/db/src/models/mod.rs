//! Row structs and insert DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row and, where rows are inserted from Rust, a create DTO.

pub mod booking;
pub mod field;
pub mod idempotency;
pub mod notification;
pub mod payment;
pub mod slot;
