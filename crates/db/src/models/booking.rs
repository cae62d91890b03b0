//! Booking entity model.

use fieldbook_core::booking_state::is_consistent_at_rest;
use fieldbook_core::status::{BookingStatus, PaymentStatus, SlotStatus, StatusId};
use fieldbook_core::types::{AmountCents, DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `bookings` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Booking {
    pub id: DbId,
    pub user_id: DbId,
    pub field_id: DbId,
    pub slot_id: DbId,
    pub status_id: StatusId,
    pub payment_status_id: StatusId,
    pub total_amount_cents: AmountCents,
    pub expires_at: Timestamp,
    pub idempotency_key: Option<String>,
    pub order_id: Option<String>,
    pub payment_initiated_at: Option<Timestamp>,
    pub settled_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Booking {
    /// Booking status; unknown ids are treated as failed, which admits no
    /// further transitions.
    pub fn status(&self) -> BookingStatus {
        BookingStatus::from_id(self.status_id).unwrap_or(BookingStatus::Failed)
    }

    pub fn payment_status(&self) -> PaymentStatus {
        PaymentStatus::from_id(self.payment_status_id).unwrap_or(PaymentStatus::Failed)
    }
}

/// Values for inserting a draft booking.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: DbId,
    pub field_id: DbId,
    pub slot_id: DbId,
    pub total_amount_cents: AmountCents,
    pub expires_at: Timestamp,
    pub idempotency_key: Option<String>,
}

/// A booking reclaimed by a sweep, with what is needed to notify its owner.
#[derive(Debug, Clone, FromRow)]
pub struct ReapedBooking {
    pub id: DbId,
    pub user_id: DbId,
    pub slot_id: DbId,
}

/// The latest booking of a slot joined with the slot's own status.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JointStateRow {
    pub booking_id: DbId,
    pub slot_id: DbId,
    pub user_id: DbId,
    pub slot_status_id: StatusId,
    pub booking_status_id: StatusId,
    pub payment_status_id: StatusId,
    pub settled_at: Option<Timestamp>,
    pub locked_at: Option<Timestamp>,
}

impl JointStateRow {
    /// Whether the triple is allowed at rest.
    pub fn is_consistent(&self) -> bool {
        let (Some(slot), Some(booking), Some(payment)) = (
            SlotStatus::from_id(self.slot_status_id),
            BookingStatus::from_id(self.booking_status_id),
            PaymentStatus::from_id(self.payment_status_id),
        ) else {
            return false;
        };
        let relocked = match (self.locked_at, self.settled_at) {
            (Some(locked_at), Some(settled_at)) => locked_at > settled_at,
            _ => false,
        };
        is_consistent_at_rest(slot, booking, payment, relocked)
    }
}
