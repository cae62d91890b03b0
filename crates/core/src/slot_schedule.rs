//! Slot projection from a field's operating hours.
//!
//! Slots are not pre-materialized: the bookable windows of a day are
//! computed from the field schedule, and a persisted slot row only exists
//! once a window has been locked or booked. This module holds the pure
//! projection; the API layer merges in persisted rows keyed by
//! `(field_id, start minute)`.

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::CoreError;
use crate::status::{FieldStatus, SlotStatus};
use crate::types::{AmountCents, Timestamp};

/// Slots starting sooner than this are flagged as needing staff confirmation.
pub const CONFIRMATION_WINDOW_HOURS: i64 = 24;

/// Upper bound on a slot duration (a full day).
pub const MAX_SLOT_DURATION_MINS: i32 = 24 * 60;

/// The scheduling parameters of a field.
#[derive(Debug, Clone)]
pub struct FieldSchedule {
    pub opening_time: NaiveTime,
    pub closing_time: NaiveTime,
    pub slot_duration_minutes: i32,
    pub timezone: Tz,
}

/// A half-open `[start, end)` window in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Window {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// The state a persisted slot row contributes to the projection.
#[derive(Debug, Clone, Copy)]
pub struct SlotOverride {
    pub status: SlotStatus,
    pub lock_expires_at: Option<Timestamp>,
}

impl FieldSchedule {
    /// Build a schedule, rejecting inverted hours, non-positive durations and
    /// unknown time zone names.
    pub fn new(
        opening_time: NaiveTime,
        closing_time: NaiveTime,
        slot_duration_minutes: i32,
        timezone: &str,
    ) -> Result<Self, CoreError> {
        if closing_time <= opening_time {
            return Err(CoreError::Validation(
                "closing time must be after opening time".into(),
            ));
        }
        if slot_duration_minutes <= 0 || slot_duration_minutes > MAX_SLOT_DURATION_MINS {
            return Err(CoreError::Validation(format!(
                "slot duration must be between 1 and {MAX_SLOT_DURATION_MINS} minutes"
            )));
        }
        let timezone = parse_timezone(timezone)?;
        Ok(Self {
            opening_time,
            closing_time,
            slot_duration_minutes,
            timezone,
        })
    }

    /// Every window of `date` in field-local time, converted to UTC.
    ///
    /// Steps from opening by the slot duration and stops before a window
    /// would end after closing; a partial trailing window is dropped. Local
    /// times that do not exist (DST gap) are skipped.
    pub fn candidate_windows(&self, date: NaiveDate) -> Vec<Window> {
        let step = Duration::minutes(i64::from(self.slot_duration_minutes));
        let close = date.and_time(self.closing_time);
        let mut cursor = date.and_time(self.opening_time);
        let mut windows = Vec::new();

        while cursor + step <= close {
            let local_end = cursor + step;
            let start = self.timezone.from_local_datetime(&cursor).earliest();
            let end = self.timezone.from_local_datetime(&local_end).earliest();
            if let (Some(start), Some(end)) = (start, end) {
                windows.push(Window {
                    start: start.with_timezone(&Utc),
                    end: end.with_timezone(&Utc),
                });
            }
            cursor = local_end;
        }

        windows
    }

    /// Find the window that starts at `start` (minute precision), if the
    /// schedule produces one on that local day.
    pub fn window_starting_at(&self, start: Timestamp) -> Option<Window> {
        let start = truncate_to_minute(start);
        let date = self.local_date(start);
        self.candidate_windows(date)
            .into_iter()
            .find(|w| w.start == start)
    }

    /// The calendar date of `instant` in the field's time zone.
    pub fn local_date(&self, instant: Timestamp) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }
}

/// Parse an IANA time zone name.
pub fn parse_timezone(name: &str) -> Result<Tz, CoreError> {
    name.parse::<Tz>()
        .map_err(|_| CoreError::Validation(format!("unknown time zone '{name}'")))
}

/// Resolve the status a window is offered with, or `None` if it is no
/// longer offered because it already started.
///
/// Precedence: started windows are dropped; a live lock wins over booked,
/// booked over unavailable; a closed field marks windows without an
/// override unavailable. An expired lock or an available row carries no
/// override.
pub fn resolve_status(
    window: &Window,
    persisted: Option<SlotOverride>,
    field_status: FieldStatus,
    now: Timestamp,
) -> Option<SlotStatus> {
    if window.start <= now {
        return None;
    }

    let status = match persisted {
        Some(SlotOverride {
            status: SlotStatus::TemporarilyLocked,
            lock_expires_at: Some(expires_at),
        }) if expires_at > now => SlotStatus::TemporarilyLocked,
        Some(SlotOverride {
            status: SlotStatus::Booked,
            ..
        }) => SlotStatus::Booked,
        Some(SlotOverride {
            status: SlotStatus::Unavailable,
            ..
        }) => SlotStatus::Unavailable,
        _ if field_status != FieldStatus::Open => SlotStatus::Unavailable,
        _ => SlotStatus::Available,
    };

    Some(status)
}

/// Advisory flag: the window starts within [`CONFIRMATION_WINDOW_HOURS`].
pub fn needs_confirmation(start: Timestamp, now: Timestamp) -> bool {
    start - now < Duration::hours(CONFIRMATION_WINDOW_HOURS)
}

/// Price of one slot from the field's hourly rate, in minor units.
pub fn slot_price_cents(hourly_price_cents: AmountCents, slot_duration_minutes: i32) -> AmountCents {
    hourly_price_cents * i64::from(slot_duration_minutes) / 60
}

/// Drop seconds and sub-second precision.
pub fn truncate_to_minute(instant: Timestamp) -> Timestamp {
    instant
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(instant)
}
