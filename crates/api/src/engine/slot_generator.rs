//! Day projection of bookable slots.
//!
//! Windows are computed from the field schedule and merged with the sparse
//! override rows stored for that day. Nothing is written here; callers sweep
//! expired locks first when they want the store itself to catch up.

use std::collections::HashMap;

use chrono::NaiveDate;
use fieldbook_core::slot_schedule::{needs_confirmation, resolve_status, slot_price_cents};
use fieldbook_core::status::SlotStatus;
use fieldbook_core::types::{AmountCents, DbId, Timestamp};
use fieldbook_db::models::field::Field;
use fieldbook_db::models::slot::NewSlot;
use fieldbook_db::repositories::SlotRepo;
use serde::Serialize;
use sqlx::PgPool;

use super::load_field;
use crate::error::AppResult;

/// A window as offered to players. Lock owners are never exposed.
#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    /// Set once the window has a persisted row.
    pub slot_id: Option<DbId>,
    pub field_id: DbId,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub status: SlotStatus,
    pub price_cents: AmountCents,
    pub deposit_cents: AmountCents,
    pub needs_confirmation: bool,
}

/// All windows of `date` (field-local) that have not started at `now`.
pub async fn generate_slots_for_day(
    pool: &PgPool,
    field_id: DbId,
    date: NaiveDate,
    now: Timestamp,
) -> AppResult<Vec<SlotView>> {
    let field = load_field(pool, field_id).await?;
    let windows = field.schedule()?.candidate_windows(date);

    let (Some(first), Some(last)) = (windows.first(), windows.last()) else {
        return Ok(Vec::new());
    };

    let persisted: HashMap<Timestamp, _> =
        SlotRepo::list_for_field_between(pool, field_id, first.start, last.end)
            .await?
            .into_iter()
            .map(|slot| (slot.start_time, slot))
            .collect();

    let price_cents = slot_price_cents(field.hourly_price_cents, field.slot_duration_minutes);
    let field_status = field.status();

    let views = windows
        .iter()
        .filter_map(|window| {
            let row = persisted.get(&window.start);
            let status = resolve_status(window, row.map(|s| s.as_override()), field_status, now)?;
            Some(SlotView {
                slot_id: row.map(|s| s.id),
                field_id,
                start_time: window.start,
                end_time: window.end,
                status,
                price_cents,
                deposit_cents: field.deposit_price_cents,
                needs_confirmation: needs_confirmation(window.start, now),
            })
        })
        .collect();

    Ok(views)
}

/// Release this field's expired locks so a following projection reads a
/// store that has caught up.
pub async fn sweep_field_locks(pool: &PgPool, field_id: DbId, now: Timestamp) -> AppResult<u64> {
    let released = SlotRepo::release_expired_locks(pool, Some(field_id), now).await?;
    if released > 0 {
        tracing::debug!(field_id, released, "Released expired locks before listing");
    }
    Ok(released)
}

/// The row a window would be materialized as, priced at the field's
/// current rates.
pub(crate) fn new_slot_row(field: &Field, start: Timestamp, end: Timestamp) -> NewSlot {
    NewSlot {
        field_id: field.id,
        start_time: start,
        end_time: end,
        price_cents: slot_price_cents(field.hourly_price_cents, field.slot_duration_minutes),
        deposit_cents: field.deposit_price_cents,
    }
}
