//! Booking lifecycle constants, state machine and the joint-validity table.
//!
//! A booking, its slot and its payment status move together. Only the
//! combinations listed in [`JOINT_VALID_STATES`] may be observed at rest;
//! anything else is a consistency failure worth alerting on.

use chrono::Duration;

use crate::error::ReservationError;
use crate::status::{BookingStatus, PaymentStatus, SlotStatus};
use crate::types::Timestamp;

/// Lifetime of a draft booking.
pub const DRAFT_EXPIRY_MINS: i64 = 10;

/// Expired bookings older than this are purged.
pub const EXPIRED_RETENTION_DAYS: i64 = 7;

/// Expiry of a draft created at `now`.
pub fn draft_expiry(now: Timestamp) -> Timestamp {
    now + Duration::minutes(DRAFT_EXPIRY_MINS)
}

/// Cut-off before which expired bookings are purged.
pub fn retention_cutoff(now: Timestamp) -> Timestamp {
    now - Duration::days(EXPIRED_RETENTION_DAYS)
}

/// Where a live booking ends up once its deadline (`expires_at`) has
/// passed: a draft expires, an unanswered payment fails. `None` while the
/// booking is still live or already settled.
pub fn lapsed_outcome(
    status: BookingStatus,
    expires_at: Timestamp,
    now: Timestamp,
) -> Option<BookingStatus> {
    if expires_at > now {
        return None;
    }
    match status {
        BookingStatus::Draft => Some(BookingStatus::Expired),
        BookingStatus::PendingPayment => Some(BookingStatus::Failed),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

pub mod state_machine {
    use crate::status::BookingStatus;

    /// Statuses reachable from `from`. Terminal statuses return an empty slice.
    pub fn valid_transitions(from: BookingStatus) -> &'static [BookingStatus] {
        use BookingStatus::*;
        match from {
            Draft => &[PendingPayment, Expired, Cancelled],
            PendingPayment => &[Confirmed, Failed],
            Confirmed | Failed | Expired | Cancelled => &[],
        }
    }

    pub fn can_transition(from: BookingStatus, to: BookingStatus) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a transition, returning a descriptive message for invalid ones.
    pub fn validate_transition(from: BookingStatus, to: BookingStatus) -> Result<(), String> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(format!("Invalid booking transition: {from} -> {to}"))
        }
    }
}

/// Require the booking to be in `expected` before a transition.
pub fn require_status(
    actual: BookingStatus,
    expected: BookingStatus,
) -> Result<(), ReservationError> {
    if actual == expected {
        Ok(())
    } else {
        Err(ReservationError::BookingInvalidState { expected, actual })
    }
}

// ---------------------------------------------------------------------------
// Joint validity
// ---------------------------------------------------------------------------

/// A `(slot, booking, payment)` status triple.
pub type JointState = (SlotStatus, BookingStatus, PaymentStatus);

/// The only combinations allowed at rest.
pub const JOINT_VALID_STATES: [JointState; 6] = [
    (SlotStatus::TemporarilyLocked, BookingStatus::Draft, PaymentStatus::Pending),
    (
        SlotStatus::TemporarilyLocked,
        BookingStatus::PendingPayment,
        PaymentStatus::Processing,
    ),
    (SlotStatus::Booked, BookingStatus::Confirmed, PaymentStatus::Paid),
    (SlotStatus::Available, BookingStatus::Failed, PaymentStatus::Failed),
    (SlotStatus::Available, BookingStatus::Cancelled, PaymentStatus::Refunded),
    (SlotStatus::Available, BookingStatus::Expired, PaymentStatus::Failed),
];

pub fn is_valid_joint_state(slot: SlotStatus, booking: BookingStatus, payment: PaymentStatus) -> bool {
    JOINT_VALID_STATES.contains(&(slot, booking, payment))
}

/// Check the latest booking of a slot against the slot itself.
///
/// Once a booking settles terminally the slot is free, so a newer lock
/// taken after the settlement (`relocked_since_settled`) starts a fresh
/// cycle and is judged as if the slot were still available.
pub fn is_consistent_at_rest(
    slot: SlotStatus,
    booking: BookingStatus,
    payment: PaymentStatus,
    relocked_since_settled: bool,
) -> bool {
    if is_valid_joint_state(slot, booking, payment) {
        return true;
    }
    relocked_since_settled
        && booking.is_terminal()
        && slot == SlotStatus::TemporarilyLocked
        && is_valid_joint_state(SlotStatus::Available, booking, payment)
}
