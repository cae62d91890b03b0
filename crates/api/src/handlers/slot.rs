//! Handlers for the `/slots` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use fieldbook_core::types::{DbId, Timestamp};
use serde::Deserialize;

use crate::engine::lock_manager::{self, LockOutcome, SlotTarget};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /slots/lock`.
///
/// Persisted slots are addressed by `slot_id`, windows that were never
/// locked before by `start_time`.
#[derive(Debug, Deserialize)]
pub struct LockSlotRequest {
    pub field_id: DbId,
    pub slot_id: Option<DbId>,
    pub start_time: Option<Timestamp>,
}

impl LockSlotRequest {
    fn target(&self) -> AppResult<SlotTarget> {
        match (self.slot_id, self.start_time) {
            (Some(slot_id), _) => Ok(SlotTarget::Persisted(slot_id)),
            (None, Some(start_time)) => Ok(SlotTarget::Virtual { start_time }),
            (None, None) => Err(AppError::BadRequest(
                "Either slot_id or start_time is required".into(),
            )),
        }
    }
}

/// POST /api/v1/slots/lock
pub async fn lock_slot(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<LockSlotRequest>,
) -> AppResult<Json<DataResponse<LockOutcome>>> {
    let target = input.target()?;
    let outcome =
        lock_manager::lock_slot(&state.pool, input.field_id, target, auth.user_id, Utc::now())
            .await?;
    Ok(Json(DataResponse { data: outcome }))
}

/// POST /api/v1/slots/{id}/release
///
/// Returns 204 No Content once the caller's lock is gone.
pub async fn release_slot(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(slot_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    lock_manager::release_slot(&state.pool, slot_id, auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
