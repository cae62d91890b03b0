pub mod admin;
pub mod booking;
pub mod cron;
pub mod field;
pub mod notification;
pub mod payment;
pub mod slot;

use axum::http::HeaderMap;

/// Header carrying a client idempotency key when the body does not.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// The idempotency key of a request: body field first, then header.
pub(crate) fn idempotency_key(headers: &HeaderMap, from_body: Option<String>) -> Option<String> {
    from_body.or_else(|| {
        headers
            .get(IDEMPOTENCY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    })
}
