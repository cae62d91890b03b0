//! Expiry sweeps and the consistency check.
//!
//! Both sweeps are idempotent and safe to run concurrently with each other
//! and with live traffic: every transition is conditional on the state the
//! sweep expects, and a row that already moved on is skipped.

use chrono::Duration;
use fieldbook_core::booking_state::retention_cutoff;
use fieldbook_core::slot_lock::LOCK_DURATION_MINS;
use fieldbook_core::status::{BookingStatus, PaymentStatus};
use fieldbook_core::types::{DbId, Timestamp};
use fieldbook_db::models::booking::{JointStateRow, ReapedBooking};
use fieldbook_db::repositories::{BookingRepo, IdempotencyRepo, PaymentRepo, SlotRepo};
use fieldbook_events::bus::event_types;
use fieldbook_events::{EventBus, PlatformEvent};
use serde::Serialize;
use sqlx::PgPool;

use super::settle_booking_tx;
use crate::error::AppResult;

/// Maximum bookings handled per category in one pass.
const SWEEP_BATCH: i64 = 500;

/// What the booking sweep did.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ExpireReport {
    pub expired_drafts: u64,
    pub abandoned_payments: u64,
    pub purged_bookings: u64,
    pub purged_idempotency_keys: u64,
}

/// What the lock sweep did.
#[derive(Debug, Default, Clone, Serialize)]
pub struct UnlockReport {
    pub expired_locks: u64,
    pub orphaned_locks: u64,
}

/// Expire stale drafts, fail abandoned payments and purge old records.
pub async fn expire_bookings(
    pool: &PgPool,
    events: &EventBus,
    payment_timeout_mins: i64,
    now: Timestamp,
) -> AppResult<ExpireReport> {
    let mut report = ExpireReport::default();

    for booking in BookingRepo::find_expired_drafts(pool, now, SWEEP_BATCH).await? {
        match settle_stale(pool, &booking, BookingStatus::Draft, BookingStatus::Expired, now).await {
            Ok(true) => {
                report.expired_drafts += 1;
                events.publish(
                    PlatformEvent::new(event_types::BOOKING_EXPIRED)
                        .for_booking(booking.id)
                        .notify(booking.user_id),
                );
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(booking_id = booking.id, error = %e, "Failed to expire draft booking");
            }
        }
    }

    let initiated_before = now - Duration::minutes(payment_timeout_mins);
    for booking in BookingRepo::find_abandoned_payments(pool, initiated_before, SWEEP_BATCH).await? {
        match settle_stale(
            pool,
            &booking,
            BookingStatus::PendingPayment,
            BookingStatus::Failed,
            now,
        )
        .await
        {
            Ok(true) => {
                report.abandoned_payments += 1;
                events.publish(
                    PlatformEvent::new(event_types::BOOKING_FAILED)
                        .for_booking(booking.id)
                        .notify(booking.user_id)
                        .with_payload(serde_json::json!({ "reason": "payment_timeout" })),
                );
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(booking_id = booking.id, error = %e, "Failed to abandon payment");
            }
        }
    }

    report.purged_bookings = BookingRepo::purge_expired(pool, retention_cutoff(now)).await?;
    report.purged_idempotency_keys = IdempotencyRepo::purge_expired(pool, now).await?;

    if report.expired_drafts + report.abandoned_payments + report.purged_bookings > 0 {
        tracing::info!(
            expired_drafts = report.expired_drafts,
            abandoned_payments = report.abandoned_payments,
            purged_bookings = report.purged_bookings,
            "Booking sweep finished"
        );
    }

    Ok(report)
}

/// Move one stale booking to `to` with payment failed and free its slot.
///
/// Returns `false` when the booking already left `from`.
async fn settle_stale(
    pool: &PgPool,
    booking: &ReapedBooking,
    from: BookingStatus,
    to: BookingStatus,
    now: Timestamp,
) -> AppResult<bool> {
    let mut tx = pool.begin().await?;

    if !settle_lapsed_tx(&mut tx, booking.id, from, to, now).await? {
        return Ok(false);
    }
    // No-op when another player already took the lapsed lock over.
    SlotRepo::release_tx(&mut tx, booking.slot_id, booking.user_id).await?;

    tx.commit().await?;
    tracing::info!(booking_id = booking.id, slot_id = booking.slot_id, %to, "Stale booking settled");
    Ok(true)
}

/// Settle a lapsed booking's own rows: booking to `to`, payment failed,
/// and any still-processing payment attempt failed with it. The slot is
/// left to the caller.
pub(crate) async fn settle_lapsed_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    booking_id: DbId,
    from: BookingStatus,
    to: BookingStatus,
    now: Timestamp,
) -> AppResult<bool> {
    if !settle_booking_tx(tx, booking_id, from, to, PaymentStatus::Failed, now).await? {
        return Ok(false);
    }
    if from == BookingStatus::PendingPayment {
        PaymentRepo::fail_processing_for_booking_tx(tx, booking_id).await?;
    }
    Ok(true)
}

/// Release expired locks and locks no booking stands behind.
pub async fn unlock_slots(pool: &PgPool, now: Timestamp) -> AppResult<UnlockReport> {
    let expired_locks = SlotRepo::release_expired_locks(pool, None, now).await?;
    let stale_before = now - Duration::minutes(LOCK_DURATION_MINS);
    let orphaned_locks = SlotRepo::release_orphaned_locks(pool, stale_before).await?;

    if expired_locks + orphaned_locks > 0 {
        tracing::info!(expired_locks, orphaned_locks, "Lock sweep finished");
    }

    Ok(UnlockReport {
        expired_locks,
        orphaned_locks,
    })
}

/// List bookings whose slot, booking and payment statuses do not form a
/// valid combination. Each violation is logged.
pub async fn check_consistency(pool: &PgPool) -> AppResult<Vec<JointStateRow>> {
    let violations = BookingRepo::find_joint_violations(pool).await?;
    for row in &violations {
        tracing::error!(
            booking_id = row.booking_id,
            slot_id = row.slot_id,
            slot_status_id = row.slot_status_id,
            booking_status_id = row.booking_status_id,
            payment_status_id = row.payment_status_id,
            "Joint state violation"
        );
    }
    Ok(violations)
}
