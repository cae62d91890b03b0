//! Reservation engine.
//!
//! Orchestrates the slot, booking and payment state machines on top of the
//! repositories. Every function takes the current instant explicitly so the
//! same code runs under request handlers (`Utc::now()`) and deterministic
//! tests.
//!
//! - [`slot_generator`] -- day projection of a field's bookable windows.
//! - [`lock_manager`] -- compare-and-swap slot locks.
//! - [`booking`] -- draft creation, reads and cancellation.
//! - [`payment`] -- payment initiation and callback completion.
//! - [`idempotency`] -- replay protection for client retries.
//! - [`reaper`] -- expiry sweeps and the consistency check.

pub mod booking;
pub mod idempotency;
pub mod lock_manager;
pub mod payment;
pub mod reaper;
pub mod slot_generator;

use fieldbook_core::booking_state::state_machine;
use fieldbook_core::error::{CoreError, ReservationError};
use fieldbook_core::status::{BookingStatus, PaymentStatus};
use fieldbook_core::types::{DbId, Timestamp};
use fieldbook_db::models::field::Field;
use fieldbook_db::repositories::{BookingRepo, FieldRepo};
use sqlx::PgPool;

use crate::error::AppResult;

/// Load a field or fail with `FieldNotFound`.
pub(crate) async fn load_field(pool: &PgPool, field_id: DbId) -> AppResult<Field> {
    FieldRepo::find_by_id(pool, field_id)
        .await?
        .ok_or_else(|| ReservationError::FieldNotFound(field_id).into())
}

/// Move a booking from `from` to `to` if it is still in `from`.
///
/// The transition is checked against the booking state machine first; an
/// illegal pair is an engine bug and never reaches the database.
pub async fn settle_booking_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    booking_id: DbId,
    from: BookingStatus,
    to: BookingStatus,
    payment_status: PaymentStatus,
    now: Timestamp,
) -> AppResult<bool> {
    state_machine::validate_transition(from, to).map_err(CoreError::Internal)?;
    Ok(BookingRepo::settle_tx(tx, booking_id, from, to, payment_status, now).await?)
}
