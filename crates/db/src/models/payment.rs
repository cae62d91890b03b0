//! Payment attempt model.

use fieldbook_core::status::{PaymentStatus, StatusId};
use fieldbook_core::types::{AmountCents, DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `payments` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Payment {
    pub id: DbId,
    pub booking_id: DbId,
    pub amount_cents: AmountCents,
    pub currency: String,
    pub order_id: String,
    pub transaction_id: Option<String>,
    pub status_id: StatusId,
    pub payment_url: Option<String>,
    pub provider_metadata: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Payment {
    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::from_id(self.status_id).unwrap_or(PaymentStatus::Failed)
    }
}

/// Values for recording a payment attempt.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub booking_id: DbId,
    pub amount_cents: AmountCents,
    pub currency: String,
    pub order_id: String,
    pub payment_url: Option<String>,
    pub provider_metadata: serde_json::Value,
}
