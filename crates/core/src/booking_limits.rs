//! Daily and weekly playing-time allowances.
//!
//! Limits are soft quotas: they are evaluated before a booking is created
//! and may rarely race with a concurrent create by the same player.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::ReservationError;
use crate::types::Timestamp;

/// Maximum minutes of active bookings per calendar day.
pub const DAILY_LIMIT_MINS: i64 = 120;

/// Maximum minutes of active bookings per calendar week (Sunday start).
pub const WEEKLY_LIMIT_MINS: i64 = 240;

/// A half-open UTC range covering a local calendar period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: Timestamp,
    pub end: Timestamp,
}

/// Minutes a player already holds in the periods containing the new slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LimitUsage {
    pub day_minutes: i64,
    pub week_minutes: i64,
}

/// The local day containing `date`.
pub fn day_bounds(date: NaiveDate, tz: Tz) -> Period {
    let next = date + Duration::days(1);
    Period {
        start: local_midnight(date, tz),
        end: local_midnight(next, tz),
    }
}

/// The local week (Sunday through Saturday) containing `date`.
pub fn week_bounds(date: NaiveDate, tz: Tz) -> Period {
    let offset = i64::from(date.weekday().num_days_from_sunday());
    let first = date - Duration::days(offset);
    Period {
        start: local_midnight(first, tz),
        end: local_midnight(first + Duration::days(7), tz),
    }
}

/// Reject a slot of `requested_minutes` that would push either total over
/// its limit. Reaching a limit exactly is allowed.
pub fn check_booking_limits(
    usage: &LimitUsage,
    requested_minutes: i64,
) -> Result<(), ReservationError> {
    if usage.day_minutes + requested_minutes > DAILY_LIMIT_MINS {
        return Err(ReservationError::BookingLimitExceeded(format!(
            "daily limit of {DAILY_LIMIT_MINS} minutes reached ({} booked)",
            usage.day_minutes
        )));
    }
    if usage.week_minutes + requested_minutes > WEEKLY_LIMIT_MINS {
        return Err(ReservationError::BookingLimitExceeded(format!(
            "weekly limit of {WEEKLY_LIMIT_MINS} minutes reached ({} booked)",
            usage.week_minutes
        )));
    }
    Ok(())
}

/// Start of `date` in `tz`. Zones whose DST change skips midnight fall back
/// to the first instant after the gap.
fn local_midnight(date: NaiveDate, tz: Tz) -> Timestamp {
    let midnight: NaiveDateTime = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(midnight + Duration::hours(1))).earliest())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}
