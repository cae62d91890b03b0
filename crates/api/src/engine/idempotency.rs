//! Idempotency guard.
//!
//! A key is claimed before the guarded operation runs. Repeats replay the
//! stored response, report the original as still running, or are rejected
//! when the key is misused. A failed operation gives its claim back so the
//! client can retry with the same key.

use fieldbook_core::error::ReservationError;
use fieldbook_core::idempotency::{evaluate_repeat, request_hash, ttl_for, validate_key, Replay};
use fieldbook_core::types::{DbId, Timestamp};
use fieldbook_db::repositories::IdempotencyRepo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};

/// Times a claim is retried when the conflicting record vanished between
/// the insert and the read (purged or given back).
const CLAIM_ATTEMPTS: usize = 3;

/// Outcome of [`begin`].
#[derive(Debug)]
pub enum Begin {
    /// First use of the key; run the operation and then [`finish`] the claim.
    Proceed(Claim),
    /// The operation already completed; this is its response.
    Replay(serde_json::Value),
}

/// A recorded key with no response yet.
#[derive(Debug, Clone)]
pub struct Claim {
    key: String,
    user_id: DbId,
    operation: &'static str,
    request_hash: String,
}

/// Claim `key` for `operation` with `payload`, or resolve it as a repeat.
pub async fn begin<P: Serialize>(
    pool: &PgPool,
    key: &str,
    user_id: DbId,
    operation: &'static str,
    payload: &P,
    now: Timestamp,
) -> AppResult<Begin> {
    validate_key(key)?;

    let purged = IdempotencyRepo::purge_expired(pool, now).await?;
    if purged > 0 {
        tracing::debug!(purged, "Purged expired idempotency keys");
    }

    let hash = request_hash(payload);
    let expires_at = now + ttl_for(operation);

    for _ in 0..CLAIM_ATTEMPTS {
        if IdempotencyRepo::try_insert(pool, key, user_id, operation, &hash, expires_at).await? {
            return Ok(Begin::Proceed(Claim {
                key: key.to_string(),
                user_id,
                operation,
                request_hash: hash,
            }));
        }

        let Some(record) = IdempotencyRepo::find_by_key(pool, key).await? else {
            continue;
        };

        return match evaluate_repeat(&record.to_stored(), user_id, operation, &hash)? {
            Replay::Completed(response) => {
                tracing::info!(user_id, operation, "Replaying stored response");
                Ok(Begin::Replay(response))
            }
            Replay::InFlight => Err(ReservationError::BookingInProgress.into()),
        };
    }

    Err(ReservationError::BookingInProgress.into())
}

/// Store the response of a successful operation, or give the claim back
/// when it failed.
///
/// Bookkeeping failures are logged; the operation's own result stands.
pub async fn finish<T: Serialize>(
    pool: &PgPool,
    claim: Option<Claim>,
    result: &AppResult<T>,
    now: Timestamp,
) {
    let Some(claim) = claim else {
        return;
    };

    match result {
        Ok(response) => {
            let response = match serde_json::to_value(response) {
                Ok(value) => value,
                Err(e) => {
                    tracing::error!(error = %e, key = %claim.key, "Failed to encode idempotent response");
                    return;
                }
            };
            let expires_at = now + ttl_for(claim.operation);
            if let Err(e) = IdempotencyRepo::save_response(
                pool,
                &claim.key,
                claim.user_id,
                claim.operation,
                &claim.request_hash,
                &response,
                expires_at,
            )
            .await
            {
                tracing::error!(error = %e, key = %claim.key, "Failed to save idempotent response");
            }
        }
        Err(_) => {
            if let Err(e) = IdempotencyRepo::delete_in_flight(pool, &claim.key, claim.user_id).await {
                tracing::error!(error = %e, key = %claim.key, "Failed to release idempotency key");
            }
        }
    }
}

/// Decode a replayed response into the operation's response type.
pub fn decode_replay<T: DeserializeOwned>(response: serde_json::Value) -> AppResult<T> {
    serde_json::from_value(response)
        .map_err(|e| AppError::InternalError(format!("Stored response is unreadable: {e}")))
}

