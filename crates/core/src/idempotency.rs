//! Idempotency key rules.
//!
//! A client-supplied key maps to exactly one logical request. The first use
//! records the key with no response; a repeat either replays the stored
//! response, reports the request as still in flight, or is rejected when the
//! key is reused by another user, for another operation, or with a different
//! payload.

use chrono::Duration;
use rand::Rng;
use serde::Serialize;

use crate::error::ReservationError;
use crate::hashing::sha256_hex;
use crate::types::{DbId, Timestamp};

/// Operation name for booking creation.
pub const OP_CREATE_BOOKING: &str = "create_booking";

/// Operation name for payment initiation.
pub const OP_INITIATE_PAYMENT: &str = "initiate_payment";

/// Retention of booking creation responses.
pub const BOOKING_TTL_MINS: i64 = 60;

/// Retention of payment initiation responses.
pub const PAYMENT_TTL_MINS: i64 = 30;

/// Maximum accepted key length.
pub const MAX_KEY_LENGTH: usize = 128;

/// Length of the random suffix of generated keys.
const KEY_RANDOM_LENGTH: usize = 12;

/// TTL for records of `operation`.
pub fn ttl_for(operation: &str) -> Duration {
    match operation {
        OP_INITIATE_PAYMENT => Duration::minutes(PAYMENT_TTL_MINS),
        _ => Duration::minutes(BOOKING_TTL_MINS),
    }
}

/// Generate an opaque key: `{prefix}_{unix_millis}_{random}`.
pub fn generate_key(prefix: &str, now: Timestamp) -> String {
    let random: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(KEY_RANDOM_LENGTH)
        .map(char::from)
        .collect();
    format!("{prefix}_{}_{random}", now.timestamp_millis())
}

/// SHA-256 hex digest of the canonical JSON form of a request payload.
///
/// `serde_json` objects keep keys sorted, so logically equal payloads hash
/// equally regardless of field order in the incoming body.
pub fn request_hash<T: Serialize>(payload: &T) -> String {
    let canonical = serde_json::to_value(payload)
        .map(|v| v.to_string())
        .unwrap_or_default();
    sha256_hex(canonical.as_bytes())
}

/// The stored side of a key, as read back from the database.
#[derive(Debug, Clone)]
pub struct StoredKey {
    pub user_id: DbId,
    pub operation: String,
    pub request_hash: String,
    pub response: Option<serde_json::Value>,
}

/// Outcome of checking a key that already exists.
#[derive(Debug, Clone, PartialEq)]
pub enum Replay {
    /// The original request finished; return this response verbatim.
    Completed(serde_json::Value),
    /// The original request has not finished yet.
    InFlight,
}

/// Compare a repeat request against the stored key.
pub fn evaluate_repeat(
    stored: &StoredKey,
    user_id: DbId,
    operation: &str,
    request_hash: &str,
) -> Result<Replay, ReservationError> {
    if stored.user_id != user_id || stored.operation != operation {
        return Err(ReservationError::IdempotencyKeyMisuse);
    }
    if stored.request_hash != request_hash {
        return Err(ReservationError::DuplicateRequestConflict);
    }
    Ok(match &stored.response {
        Some(response) => Replay::Completed(response.clone()),
        None => Replay::InFlight,
    })
}

/// Validate the shape of a client key.
pub fn validate_key(key: &str) -> Result<(), crate::error::CoreError> {
    if key.trim().is_empty() || key.len() > MAX_KEY_LENGTH {
        return Err(crate::error::CoreError::Validation(format!(
            "idempotency key must be 1 to {MAX_KEY_LENGTH} characters"
        )));
    }
    Ok(())
}
