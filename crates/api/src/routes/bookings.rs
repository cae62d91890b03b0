//! Route definitions for the `/bookings` resource.
//!
//! All endpoints require authentication.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{booking, payment};
use crate::state::AppState;

/// Routes mounted at `/bookings`.
///
/// ```text
/// POST   /                          -> create_booking
/// GET    /{id}                      -> get_booking
/// POST   /{id}/cancel               -> cancel_booking
/// POST   /{id}/payments             -> initiate_payment
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(booking::create_booking))
        .route("/{id}", get(booking::get_booking))
        .route("/{id}/cancel", post(booking::cancel_booking))
        .route("/{id}/payments", post(payment::initiate_payment))
}
