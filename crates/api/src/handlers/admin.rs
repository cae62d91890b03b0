//! Admin-only handlers: field setup, slot overrides and consistency.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{NaiveTime, Utc};
use fieldbook_core::error::CoreError;
use fieldbook_core::slot_schedule::FieldSchedule;
use fieldbook_core::status::FieldStatus;
use fieldbook_core::types::{AmountCents, DbId, Timestamp};
use fieldbook_db::models::field::CreateField;
use fieldbook_db::repositories::FieldRepo;
use serde::Deserialize;
use validator::Validate;

use crate::engine::{lock_manager, reaper};
use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /admin/fields`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateFieldRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub opening_time: NaiveTime,
    pub closing_time: NaiveTime,
    #[validate(range(min = 1, max = 1440))]
    pub slot_duration_minutes: i32,
    #[validate(range(min = 0))]
    pub hourly_price_cents: AmountCents,
    #[validate(range(min = 0))]
    pub deposit_price_cents: AmountCents,
    pub timezone: Option<String>,
    pub status: Option<FieldStatus>,
}

/// Request body for `PUT /admin/fields/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct FieldStatusRequest {
    pub status: FieldStatus,
}

/// Request body for `POST /admin/slots/block`.
#[derive(Debug, Deserialize)]
pub struct BlockSlotRequest {
    pub field_id: DbId,
    pub start_time: Timestamp,
}

/// POST /api/v1/admin/fields
pub async fn create_field(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CreateFieldRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let timezone = input.timezone.unwrap_or_else(|| "UTC".to_string());
    FieldSchedule::new(
        input.opening_time,
        input.closing_time,
        input.slot_duration_minutes,
        &timezone,
    )?;

    let field = FieldRepo::create(
        &state.pool,
        &CreateField {
            name: input.name,
            opening_time: input.opening_time,
            closing_time: input.closing_time,
            slot_duration_minutes: input.slot_duration_minutes,
            hourly_price_cents: input.hourly_price_cents,
            deposit_price_cents: input.deposit_price_cents,
            timezone: Some(timezone),
            status_id: input.status.map(FieldStatus::id),
        },
    )
    .await?;

    tracing::info!(field_id = field.id, admin_id = admin.user_id, "Field created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: field })))
}

/// PUT /api/v1/admin/fields/{id}/status
pub async fn set_field_status(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(field_id): Path<DbId>,
    Json(input): Json<FieldStatusRequest>,
) -> AppResult<impl IntoResponse> {
    if !FieldRepo::set_status(&state.pool, field_id, input.status).await? {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "Field",
            id: field_id,
        }));
    }
    tracing::info!(field_id, status = %input.status, admin_id = admin.user_id, "Field status changed");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/admin/slots/{id}/release
pub async fn release_slot(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(slot_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    lock_manager::admin_release(&state.pool, slot_id).await?;
    tracing::info!(slot_id, admin_id = admin.user_id, "Admin slot release");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/admin/slots/block
pub async fn block_slot(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<BlockSlotRequest>,
) -> AppResult<impl IntoResponse> {
    let slot =
        lock_manager::block_slot(&state.pool, input.field_id, input.start_time, Utc::now()).await?;
    tracing::info!(slot_id = slot.id, admin_id = admin.user_id, "Admin slot block");
    Ok(Json(DataResponse { data: slot }))
}

/// GET /api/v1/admin/consistency
pub async fn consistency(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let violations = reaper::check_consistency(&state.pool).await?;
    Ok(Json(DataResponse { data: violations }))
}
