//! Periodic reaper loop.
//!
//! Runs the booking sweep, the lock sweep and the consistency check on a
//! fixed interval. The cron endpoints run the same sweeps; overlapping runs
//! are harmless.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fieldbook_events::EventBus;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::engine::reaper;

/// Run the reaper loop until `cancel` is triggered.
pub async fn run(
    pool: PgPool,
    events: Arc<EventBus>,
    interval_secs: u64,
    payment_timeout_mins: i64,
    cancel: CancellationToken,
) {
    tracing::info!(interval_secs, payment_timeout_mins, "Reaper started");

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Reaper stopping");
                break;
            }
            _ = interval.tick() => {
                run_once(&pool, &events, payment_timeout_mins).await;
            }
        }
    }
}

/// One pass of every sweep. Failures are logged; the next tick retries.
pub async fn run_once(pool: &PgPool, events: &EventBus, payment_timeout_mins: i64) {
    let now = Utc::now();

    if let Err(e) = reaper::expire_bookings(pool, events, payment_timeout_mins, now).await {
        tracing::error!(error = %e, "Reaper: booking sweep failed");
    }
    if let Err(e) = reaper::unlock_slots(pool, now).await {
        tracing::error!(error = %e, "Reaper: lock sweep failed");
    }
    match reaper::check_consistency(pool).await {
        Ok(violations) if !violations.is_empty() => {
            tracing::error!(count = violations.len(), "Reaper: joint state violations found");
        }
        Ok(_) => tracing::debug!("Reaper: joint states consistent"),
        Err(e) => tracing::error!(error = %e, "Reaper: consistency check failed"),
    }
}
