//! Handlers for the `/bookings` resource.
//!
//! All endpoints require authentication via [`AuthUser`].

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use fieldbook_core::types::DbId;
use serde::Deserialize;
use validator::Validate;

use super::idempotency_key;
use crate::engine::booking::{self, CreateBooking};
use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /bookings`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub slot_id: DbId,
    pub field_id: DbId,
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: Option<String>,
}

/// POST /api/v1/bookings
///
/// Creates a draft on a slot the caller has locked. Replays of the same
/// idempotency key return the original response.
pub async fn create_booking(
    auth: AuthUser,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateBookingRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let key = idempotency_key(&headers, input.idempotency_key);

    let created = booking::create_booking(
        &state.pool,
        &state.event_bus,
        auth.user_id,
        &CreateBooking {
            slot_id: input.slot_id,
            field_id: input.field_id,
        },
        key.as_deref(),
        Utc::now(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: created })))
}

/// GET /api/v1/bookings/{id}
pub async fn get_booking(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(booking_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let detail = booking::get_booking(&state.pool, booking_id, &auth).await?;
    Ok(Json(DataResponse { data: detail }))
}

/// POST /api/v1/bookings/{id}/cancel
pub async fn cancel_booking(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(booking_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let cancelled = booking::cancel_booking(
        &state.pool,
        &state.event_bus,
        booking_id,
        auth.user_id,
        Utc::now(),
    )
    .await?;
    Ok(Json(DataResponse { data: cancelled }))
}
