//! Route definitions for the `/fields` resource.
//!
//! Read-only and public.

use axum::routing::get;
use axum::Router;

use crate::handlers::field;
use crate::state::AppState;

/// Routes mounted at `/fields`.
///
/// ```text
/// GET    /{id}                      -> get_field
/// GET    /{id}/slots?date=          -> list_slots
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(field::get_field))
        .route("/{id}/slots", get(field::list_slots))
}
