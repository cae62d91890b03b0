//! Slot lock decision rules.
//!
//! Given the observed state of a persisted slot row, decide whether a
//! player's lock request acquires a fresh lock, extends their own, or is
//! rejected. The database layer turns the plan into a conditional update
//! that only applies if the row still matches the observation.

use chrono::Duration;

use crate::error::ReservationError;
use crate::status::SlotStatus;
use crate::types::{DbId, Timestamp};

/// Fixed lifetime of a slot lock.
pub const LOCK_DURATION_MINS: i64 = 5;

/// How many times a lost compare-and-swap is re-read before giving up.
pub const MAX_LOCK_ATTEMPTS: usize = 3;

/// The lock-relevant columns of a slot row at the time it was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockObservation {
    pub status: SlotStatus,
    pub owner: Option<DbId>,
    pub expires_at: Option<Timestamp>,
}

/// What a successful lock request will do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockPlan {
    /// Take the slot (free, or a dead lock being handed over).
    Acquire { expires_at: Timestamp },
    /// Push the caller's own live lock forward.
    Extend { expires_at: Timestamp },
}

impl LockPlan {
    pub fn expires_at(self) -> Timestamp {
        match self {
            LockPlan::Acquire { expires_at } | LockPlan::Extend { expires_at } => expires_at,
        }
    }

    pub fn is_extension(self) -> bool {
        matches!(self, LockPlan::Extend { .. })
    }
}

/// Expiry of a lock taken at `now`.
pub fn lock_expiry(now: Timestamp) -> Timestamp {
    now + Duration::minutes(LOCK_DURATION_MINS)
}

/// Whether the observed lock is still held at `now`.
pub fn is_live_lock(observation: &LockObservation, now: Timestamp) -> bool {
    observation.status == SlotStatus::TemporarilyLocked
        && observation.expires_at.is_some_and(|t| t > now)
}

/// Decide the outcome of `user_id` asking to lock a slot in `observation`.
pub fn plan_lock(
    observation: &LockObservation,
    user_id: DbId,
    now: Timestamp,
) -> Result<LockPlan, ReservationError> {
    let expires_at = lock_expiry(now);
    match observation.status {
        SlotStatus::Available => Ok(LockPlan::Acquire { expires_at }),
        SlotStatus::Booked => Err(ReservationError::SlotAlreadyBooked),
        SlotStatus::Unavailable => Err(ReservationError::SlotUnavailable),
        SlotStatus::TemporarilyLocked if !is_live_lock(observation, now) => {
            Ok(LockPlan::Acquire { expires_at })
        }
        SlotStatus::TemporarilyLocked if observation.owner == Some(user_id) => {
            // Never shorten a lock that was already pushed further out, e.g.
            // by a booking holding the slot.
            let current = observation.expires_at.unwrap_or(expires_at);
            Ok(LockPlan::Extend {
                expires_at: current.max(expires_at),
            })
        }
        SlotStatus::TemporarilyLocked => Err(ReservationError::SlotLockedByOther),
    }
}

/// Check that `user_id` holds a live lock, as required to create a booking.
pub fn verify_held_by(
    observation: &LockObservation,
    user_id: DbId,
    now: Timestamp,
) -> Result<(), ReservationError> {
    match observation.status {
        SlotStatus::TemporarilyLocked if observation.owner == Some(user_id) => {
            if is_live_lock(observation, now) {
                Ok(())
            } else {
                Err(ReservationError::SlotLockExpired)
            }
        }
        SlotStatus::TemporarilyLocked if !is_live_lock(observation, now) => {
            Err(ReservationError::SlotLockExpired)
        }
        SlotStatus::TemporarilyLocked => Err(ReservationError::SlotLockedByOther),
        SlotStatus::Booked => Err(ReservationError::SlotAlreadyBooked),
        // An available row means the caller's lock was swept or released.
        SlotStatus::Available => Err(ReservationError::SlotLockExpired),
        SlotStatus::Unavailable => Err(ReservationError::SlotUnavailable),
    }
}
