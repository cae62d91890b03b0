//! Slot override row model.

use fieldbook_core::slot_lock::LockObservation;
use fieldbook_core::slot_schedule::SlotOverride;
use fieldbook_core::status::{SlotStatus, StatusId};
use fieldbook_core::types::{AmountCents, DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `slots` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Slot {
    pub id: DbId,
    pub field_id: DbId,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub status_id: StatusId,
    pub locked_by: Option<DbId>,
    pub lock_expires_at: Option<Timestamp>,
    pub locked_at: Option<Timestamp>,
    pub price_cents: AmountCents,
    pub deposit_cents: AmountCents,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Slot {
    /// Slot status; unknown ids are treated as unavailable.
    pub fn status(&self) -> SlotStatus {
        SlotStatus::from_id(self.status_id).unwrap_or(SlotStatus::Unavailable)
    }

    /// The lock-relevant columns, as the compare-and-swap expectation.
    pub fn observation(&self) -> LockObservation {
        LockObservation {
            status: self.status(),
            owner: self.locked_by,
            expires_at: self.lock_expires_at,
        }
    }

    /// What this row contributes to the slot projection.
    pub fn as_override(&self) -> SlotOverride {
        SlotOverride {
            status: self.status(),
            lock_expires_at: self.lock_expires_at,
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

/// Values for materializing a virtual slot on first lock.
#[derive(Debug, Clone)]
pub struct NewSlot {
    pub field_id: DbId,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub price_cents: AmountCents,
    pub deposit_cents: AmountCents,
}
