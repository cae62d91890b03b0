//! Scheduled sweep triggers, authenticated with the shared cron secret.

use axum::extract::State;
use axum::Json;
use chrono::Utc;

use crate::engine::reaper::{self, ExpireReport, UnlockReport};
use crate::error::AppResult;
use crate::middleware::cron::CronAuth;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/cron/expire-bookings
pub async fn expire_bookings(
    _cron: CronAuth,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<ExpireReport>>> {
    let report = reaper::expire_bookings(
        &state.pool,
        &state.event_bus,
        state.config.payment.timeout_mins,
        Utc::now(),
    )
    .await?;
    tracing::info!(?report, "Scheduled booking sweep ran");
    Ok(Json(DataResponse { data: report }))
}

/// POST /api/v1/cron/unlock-slots
pub async fn unlock_slots(
    _cron: CronAuth,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<UnlockReport>>> {
    let report = reaper::unlock_slots(&state.pool, Utc::now()).await?;
    tracing::info!(?report, "Scheduled lock sweep ran");
    Ok(Json(DataResponse { data: report }))
}
