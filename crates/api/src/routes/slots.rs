//! Route definitions for the `/slots` resource.
//!
//! All endpoints require authentication.

use axum::routing::post;
use axum::Router;

use crate::handlers::slot;
use crate::state::AppState;

/// Routes mounted at `/slots`.
///
/// ```text
/// POST   /lock                      -> lock_slot
/// POST   /{id}/release              -> release_slot
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/lock", post(slot::lock_slot))
        .route("/{id}/release", post(slot::release_slot))
}
