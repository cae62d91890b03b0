//! Repository for the `idempotency_keys` table.
//!
//! The unique constraint on `key` is the arbiter between concurrent first
//! uses: exactly one insert wins, every other caller reads the winner's row.

use fieldbook_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::idempotency::IdempotencyRecord;

/// Column list for `idempotency_keys` queries.
const COLUMNS: &str =
    "id, key, user_id, operation, request_hash, response, expires_at, created_at, updated_at";

/// Provides insert-or-read, response storage and TTL purge for keys.
pub struct IdempotencyRepo;

impl IdempotencyRepo {
    /// Record the first use of a key with no response.
    ///
    /// Returns `false` if the key already exists.
    pub async fn try_insert(
        pool: &PgPool,
        key: &str,
        user_id: DbId,
        operation: &str,
        request_hash: &str,
        expires_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO idempotency_keys (key, user_id, operation, request_hash, expires_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT ON CONSTRAINT uq_idempotency_keys_key DO NOTHING",
        )
        .bind(key)
        .bind(user_id)
        .bind(operation)
        .bind(request_hash)
        .bind(expires_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a key record.
    pub async fn find_by_key(
        pool: &PgPool,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM idempotency_keys WHERE key = $1");
        sqlx::query_as::<_, IdempotencyRecord>(&query)
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    /// Store the final response and reset the TTL.
    pub async fn save_response(
        pool: &PgPool,
        key: &str,
        user_id: DbId,
        operation: &str,
        request_hash: &str,
        response: &serde_json::Value,
        expires_at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO idempotency_keys \
                (key, user_id, operation, request_hash, response, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT ON CONSTRAINT uq_idempotency_keys_key DO UPDATE \
             SET response = EXCLUDED.response, expires_at = EXCLUDED.expires_at \
             WHERE idempotency_keys.user_id = EXCLUDED.user_id",
        )
        .bind(key)
        .bind(user_id)
        .bind(operation)
        .bind(request_hash)
        .bind(response)
        .bind(expires_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Drop an in-flight record so the client can retry with the same key.
    /// Completed records are kept.
    pub async fn delete_in_flight(
        pool: &PgPool,
        key: &str,
        user_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM idempotency_keys WHERE key = $1 AND user_id = $2 AND response IS NULL",
        )
        .bind(key)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete records whose TTL passed at or before `now`.
    pub async fn purge_expired(pool: &PgPool, now: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at <= $1")
            .bind(now)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
