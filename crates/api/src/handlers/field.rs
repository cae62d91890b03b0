//! Handlers for the `/fields` resource.
//!
//! Read-only and public; lock owners never appear in responses.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{NaiveDate, Utc};
use fieldbook_core::types::DbId;
use fieldbook_db::models::field::Field;
use serde::Deserialize;

use crate::engine::slot_generator::{self, SlotView};
use crate::engine::load_field;
use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Query parameters for `GET /fields/{id}/slots`.
#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    /// Calendar date in the field's time zone.
    pub date: NaiveDate,
}

/// GET /api/v1/fields/{id}
pub async fn get_field(
    State(state): State<AppState>,
    Path(field_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Field>>> {
    let field = load_field(&state.pool, field_id).await?;
    Ok(Json(DataResponse { data: field }))
}

/// GET /api/v1/fields/{id}/slots?date=YYYY-MM-DD
///
/// Sweeps this field's expired locks, then projects the day.
pub async fn list_slots(
    State(state): State<AppState>,
    Path(field_id): Path<DbId>,
    Query(params): Query<SlotsQuery>,
) -> AppResult<Json<DataResponse<Vec<SlotView>>>> {
    let now = Utc::now();
    slot_generator::sweep_field_locks(&state.pool, field_id, now).await?;
    let slots =
        slot_generator::generate_slots_for_day(&state.pool, field_id, params.date, now).await?;
    Ok(Json(DataResponse { data: slots }))
}
