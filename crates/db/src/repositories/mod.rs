//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` (or an open transaction for the `_tx` variants) as the
//! first argument. Every slot mutation is a conditional update; callers
//! read the affected-row count to learn whether they won.

pub mod booking_repo;
pub mod field_repo;
pub mod idempotency_repo;
pub mod notification_repo;
pub mod payment_repo;
pub mod slot_repo;

pub use booking_repo::BookingRepo;
pub use field_repo::FieldRepo;
pub use idempotency_repo::IdempotencyRepo;
pub use notification_repo::NotificationRepo;
pub use payment_repo::PaymentRepo;
pub use slot_repo::SlotRepo;
