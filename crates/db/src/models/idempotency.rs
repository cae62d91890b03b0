//! Idempotency record model.

use fieldbook_core::idempotency::StoredKey;
use fieldbook_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `idempotency_keys` table.
#[derive(Debug, Clone, FromRow)]
pub struct IdempotencyRecord {
    pub id: DbId,
    pub key: String,
    pub user_id: DbId,
    pub operation: String,
    pub request_hash: String,
    pub response: Option<serde_json::Value>,
    pub expires_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl IdempotencyRecord {
    pub fn to_stored(&self) -> StoredKey {
        StoredKey {
            user_id: self.user_id,
            operation: self.operation.clone(),
            request_hash: self.request_hash.clone(),
            response: self.response.clone(),
        }
    }
}
