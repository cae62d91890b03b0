//! Route definitions for the `/payments` resource.

use axum::routing::post;
use axum::Router;

use crate::handlers::payment;
use crate::state::AppState;

/// Routes mounted at `/payments`.
///
/// ```text
/// POST   /webhook                   -> payment_webhook
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(payment::payment_webhook))
}
