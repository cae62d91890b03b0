//! Field entity model.

use chrono::NaiveTime;
use fieldbook_core::error::CoreError;
use fieldbook_core::slot_schedule::FieldSchedule;
use fieldbook_core::status::{FieldStatus, StatusId};
use fieldbook_core::types::{AmountCents, DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `fields` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Field {
    pub id: DbId,
    pub name: String,
    pub opening_time: NaiveTime,
    pub closing_time: NaiveTime,
    pub slot_duration_minutes: i32,
    pub hourly_price_cents: AmountCents,
    pub deposit_price_cents: AmountCents,
    pub timezone: String,
    pub status_id: StatusId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Field {
    /// Operational status. The lookup foreign key guarantees a known id;
    /// anything else is treated as closed.
    pub fn status(&self) -> FieldStatus {
        FieldStatus::from_id(self.status_id).unwrap_or(FieldStatus::Closed)
    }

    /// The scheduling parameters used to project slots.
    pub fn schedule(&self) -> Result<FieldSchedule, CoreError> {
        FieldSchedule::new(
            self.opening_time,
            self.closing_time,
            self.slot_duration_minutes,
            &self.timezone,
        )
    }
}

/// DTO for creating a field. Fields are managed outside the booking flow;
/// this exists for seeding and tests.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateField {
    pub name: String,
    pub opening_time: NaiveTime,
    pub closing_time: NaiveTime,
    pub slot_duration_minutes: i32,
    pub hourly_price_cents: AmountCents,
    pub deposit_price_cents: AmountCents,
    pub timezone: Option<String>,
    pub status_id: Option<StatusId>,
}
