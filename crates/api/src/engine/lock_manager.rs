//! Slot locks.
//!
//! A lock is the only way to claim a window. Every mutation is a
//! conditional update that must still match the row as it was read; a lost
//! race re-reads the row and re-plans, so concurrent callers see either a
//! clean win or the conflict that beat them.

use fieldbook_core::error::{CoreError, ReservationError};
use fieldbook_core::slot_lock::{lock_expiry, plan_lock, MAX_LOCK_ATTEMPTS};
use fieldbook_core::status::{FieldStatus, SlotStatus};
use fieldbook_core::types::{DbId, Timestamp};
use fieldbook_db::models::field::Field;
use fieldbook_db::models::slot::Slot;
use fieldbook_db::repositories::SlotRepo;
use serde::Serialize;
use sqlx::PgPool;

use super::load_field;
use super::slot_generator::new_slot_row;
use crate::error::AppResult;

/// Which window a lock request targets.
#[derive(Debug, Clone, Copy)]
pub enum SlotTarget {
    /// A slot that already has a row.
    Persisted(DbId),
    /// A window identified by its start, possibly never persisted.
    Virtual { start_time: Timestamp },
}

/// Result of a successful lock request.
#[derive(Debug, Clone, Serialize)]
pub struct LockOutcome {
    pub slot_id: DbId,
    pub locked: bool,
    /// The caller already held the lock and it was pushed forward.
    pub extended: bool,
    pub lock_expires_at: Timestamp,
}

impl LockOutcome {
    fn from_slot(slot: &Slot, extended: bool, fallback_expiry: Timestamp) -> Self {
        Self {
            slot_id: slot.id,
            locked: true,
            extended,
            lock_expires_at: slot.lock_expires_at.unwrap_or(fallback_expiry),
        }
    }
}

/// Lock a window of `field_id` for `user_id`.
pub async fn lock_slot(
    pool: &PgPool,
    field_id: DbId,
    target: SlotTarget,
    user_id: DbId,
    now: Timestamp,
) -> AppResult<LockOutcome> {
    let field = load_field(pool, field_id).await?;
    if field.status() != FieldStatus::Open {
        return Err(ReservationError::SlotUnavailable.into());
    }

    let mut current = resolve_target(pool, &field, target).await?;

    for attempt in 1..=MAX_LOCK_ATTEMPTS {
        let outcome = match &current {
            Resolved::Virtual(new_slot) => {
                if new_slot.start_time <= now {
                    return Err(ReservationError::SlotAlreadyStarted.into());
                }
                let expires_at = lock_expiry(now);
                SlotRepo::insert_locked(pool, new_slot, user_id, expires_at, now)
                    .await?
                    .map(|slot| LockOutcome::from_slot(&slot, false, expires_at))
            }
            Resolved::Persisted(slot) => {
                if slot.start_time <= now {
                    return Err(ReservationError::SlotAlreadyStarted.into());
                }
                let observation = slot.observation();
                let plan = plan_lock(&observation, user_id, now)?;
                SlotRepo::compare_and_lock(
                    pool,
                    slot.id,
                    &observation,
                    user_id,
                    plan.expires_at(),
                    now,
                )
                .await?
                .map(|slot| LockOutcome::from_slot(&slot, plan.is_extension(), plan.expires_at()))
            }
        };

        if let Some(outcome) = outcome {
            tracing::info!(
                field_id,
                slot_id = outcome.slot_id,
                user_id,
                extended = outcome.extended,
                "Slot locked"
            );
            return Ok(outcome);
        }

        tracing::debug!(field_id, user_id, attempt, "Lost slot lock race, re-reading");
        current = reread(pool, &current).await?;
    }

    Err(ReservationError::SlotLockedByOther.into())
}

/// Release the caller's own lock when no draft or pending booking needs it.
///
/// Releasing a slot that is already available is a no-op.
pub async fn release_slot(pool: &PgPool, slot_id: DbId, user_id: DbId) -> AppResult<()> {
    if SlotRepo::release_owned(pool, slot_id, user_id).await? {
        tracing::info!(slot_id, user_id, "Slot lock released by owner");
        return Ok(());
    }

    let slot = SlotRepo::find_by_id(pool, slot_id)
        .await?
        .ok_or(ReservationError::SlotNotFound)?;

    match slot.status() {
        SlotStatus::Available => Ok(()),
        SlotStatus::Booked => Err(ReservationError::SlotAlreadyBooked.into()),
        SlotStatus::Unavailable => Err(ReservationError::SlotUnavailable.into()),
        SlotStatus::TemporarilyLocked if slot.locked_by == Some(user_id) => {
            Err(CoreError::Conflict("Slot is held by an open booking; cancel it instead".into()).into())
        }
        SlotStatus::TemporarilyLocked => Err(ReservationError::SlotLockedByOther.into()),
    }
}

/// Administrative release of a locked or blocked slot.
pub async fn admin_release(pool: &PgPool, slot_id: DbId) -> AppResult<()> {
    if SlotRepo::admin_release(pool, slot_id).await? {
        tracing::info!(slot_id, "Slot released by admin");
        return Ok(());
    }

    let slot = SlotRepo::find_by_id(pool, slot_id)
        .await?
        .ok_or(ReservationError::SlotNotFound)?;

    match slot.status() {
        SlotStatus::Available => Ok(()),
        SlotStatus::Booked => Err(ReservationError::SlotAlreadyBooked.into()),
        _ => Err(CoreError::Conflict("Slot has a live booking".into()).into()),
    }
}

/// Take a window out of sale. Live locks and bookings are never overridden.
pub async fn block_slot(
    pool: &PgPool,
    field_id: DbId,
    start_time: Timestamp,
    now: Timestamp,
) -> AppResult<Slot> {
    let field = load_field(pool, field_id).await?;
    let window = field
        .schedule()?
        .window_starting_at(start_time)
        .ok_or(ReservationError::SlotNotFound)?;

    let row = new_slot_row(&field, window.start, window.end);
    if let Some(slot) = SlotRepo::mark_unavailable(pool, &row, now).await? {
        tracing::info!(field_id, slot_id = slot.id, "Slot blocked");
        return Ok(slot);
    }

    match SlotRepo::find_by_field_start(pool, field_id, window.start).await? {
        Some(slot) if slot.status() == SlotStatus::Booked => {
            Err(ReservationError::SlotAlreadyBooked.into())
        }
        Some(slot) if slot.status() == SlotStatus::Unavailable => Ok(slot),
        _ => Err(ReservationError::SlotLockedByOther.into()),
    }
}

// ---------------------------------------------------------------------------
// Target resolution
// ---------------------------------------------------------------------------

enum Resolved {
    Virtual(fieldbook_db::models::slot::NewSlot),
    Persisted(Slot),
}

async fn resolve_target(pool: &PgPool, field: &Field, target: SlotTarget) -> AppResult<Resolved> {
    match target {
        SlotTarget::Persisted(slot_id) => {
            let slot = SlotRepo::find_by_id(pool, slot_id)
                .await?
                .filter(|slot| slot.field_id == field.id)
                .ok_or(ReservationError::SlotNotFound)?;
            Ok(Resolved::Persisted(slot))
        }
        SlotTarget::Virtual { start_time } => {
            let window = field
                .schedule()?
                .window_starting_at(start_time)
                .ok_or(ReservationError::SlotNotFound)?;
            match SlotRepo::find_by_field_start(pool, field.id, window.start).await? {
                Some(slot) => Ok(Resolved::Persisted(slot)),
                None => Ok(Resolved::Virtual(new_slot_row(field, window.start, window.end))),
            }
        }
    }
}

/// Re-read the row after a lost race. A virtual slot that lost its insert
/// now has a row written by the winner.
async fn reread(pool: &PgPool, current: &Resolved) -> AppResult<Resolved> {
    let slot = match current {
        Resolved::Virtual(new_slot) => {
            SlotRepo::find_by_field_start(pool, new_slot.field_id, new_slot.start_time).await?
        }
        Resolved::Persisted(slot) => SlotRepo::find_by_id(pool, slot.id).await?,
    };
    slot.map(Resolved::Persisted)
        .ok_or_else(|| ReservationError::SlotNotFound.into())
}
