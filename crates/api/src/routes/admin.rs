//! Route definitions for the `/admin` resource.
//!
//! All endpoints require the admin role.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::admin;
use crate::state::AppState;

/// Routes mounted at `/admin`.
///
/// ```text
/// POST   /fields                    -> create_field
/// PUT    /fields/{id}/status        -> set_field_status
/// POST   /slots/block               -> block_slot
/// POST   /slots/{id}/release        -> release_slot
/// GET    /consistency               -> consistency
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/fields", post(admin::create_field))
        .route("/fields/{id}/status", put(admin::set_field_status))
        .route("/slots/block", post(admin::block_slot))
        .route("/slots/{id}/release", post(admin::release_slot))
        .route("/consistency", get(admin::consistency))
}
