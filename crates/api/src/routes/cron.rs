//! Route definitions for scheduled sweeps.
//!
//! Authenticated with the cron secret rather than a user token.

use axum::routing::post;
use axum::Router;

use crate::handlers::cron;
use crate::state::AppState;

/// Routes mounted at `/cron`.
///
/// ```text
/// POST   /expire-bookings           -> expire_bookings
/// POST   /unlock-slots              -> unlock_slots
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/expire-bookings", post(cron::expire_bookings))
        .route("/unlock-slots", post(cron::unlock_slots))
}
