pub mod admin;
pub mod bookings;
pub mod cron;
pub mod fields;
pub mod health;
pub mod notifications;
pub mod payments;
pub mod slots;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /fields/{id}                                     field detail (public)
/// /fields/{id}/slots?date=YYYY-MM-DD               day view (public)
///
/// /slots/lock                                      lock or extend (POST, auth)
/// /slots/{id}/release                              release own lock (POST, auth)
///
/// /bookings                                        create draft (POST, auth)
/// /bookings/{id}                                   detail (owner or admin)
/// /bookings/{id}/cancel                            cancel draft (POST, owner)
/// /bookings/{id}/payments                          initiate payment (POST, owner)
///
/// /payments/webhook                                provider callback (signed)
///
/// /notifications                                   own notifications (auth)
///
/// /cron/expire-bookings                            booking sweep (cron secret)
/// /cron/unlock-slots                               lock sweep (cron secret)
///
/// /admin/fields                                    create field (admin only)
/// /admin/fields/{id}/status                        change field status (PUT)
/// /admin/slots/block                               block a window (POST)
/// /admin/slots/{id}/release                        force release (POST)
/// /admin/consistency                               joint state violations (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/fields", fields::router())
        .nest("/slots", slots::router())
        .nest("/bookings", bookings::router())
        .nest("/payments", payments::router())
        .nest("/notifications", notifications::router())
        .nest("/cron", cron::router())
        .nest("/admin", admin::router())
}
