//! Handlers for payment initiation and the provider callback.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use fieldbook_core::error::ReservationError;
use fieldbook_core::types::{AmountCents, DbId};
use serde::Deserialize;
use validator::Validate;

use super::idempotency_key;
use crate::engine::payment::{self, InitiatePayment, PaymentCallback};
use crate::error::AppResult;
use crate::gateway::BillingDetails;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Header carrying the callback signature.
pub const SIGNATURE_HEADER: &str = "x-payment-signature";

/// Request body for `POST /bookings/{id}/payments`.
#[derive(Debug, Deserialize, Validate)]
pub struct InitiatePaymentRequest {
    #[validate(range(min = 1))]
    pub amount: AmountCents,
    pub billing: Option<BillingDetails>,
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: Option<String>,
}

/// POST /api/v1/bookings/{id}/payments
pub async fn initiate_payment(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(booking_id): Path<DbId>,
    headers: HeaderMap,
    Json(input): Json<InitiatePaymentRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let key = idempotency_key(&headers, input.idempotency_key);

    let initiated = payment::initiate_payment(
        &state,
        auth.user_id,
        &InitiatePayment {
            booking_id,
            amount_cents: input.amount,
            billing: input.billing.unwrap_or_default(),
        },
        key.as_deref(),
        Utc::now(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: initiated })))
}

/// POST /api/v1/payments/webhook
///
/// Unauthenticated by JWT; the body must carry a valid HMAC signature in the
/// `x-payment-signature` header or a `signature` field. Nothing is read or
/// written before the signature checks out.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Map<String, serde_json::Value>>,
) -> AppResult<impl IntoResponse> {
    let mut fields = flatten_fields(body);
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| fields.remove("signature"));

    let order_id = fields.get("order_id").cloned().unwrap_or_default();

    let Some(signature) = signature else {
        tracing::warn!(%order_id, "Payment callback without signature rejected");
        return Err(ReservationError::InvalidSignature.into());
    };
    if !state.gateway.verify_signature(&fields, &signature) {
        tracing::warn!(%order_id, "Payment callback with bad signature rejected");
        return Err(ReservationError::InvalidSignature.into());
    }

    let callback = PaymentCallback::from_fields(fields)?;
    match payment::complete_booking(&state, &callback, Utc::now()).await {
        Ok(ack) => Ok(Json(DataResponse { data: ack })),
        Err(e) => {
            tracing::error!(
                order_id = %callback.order_id,
                transaction_id = ?callback.transaction_id,
                success = callback.success,
                error = %e,
                "Payment callback not applied"
            );
            Err(e)
        }
    }
}

/// Render every top-level value as the string the provider signed.
fn flatten_fields(body: serde_json::Map<String, serde_json::Value>) -> BTreeMap<String, String> {
    body.into_iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (key, text)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_scalars_as_signed_text() {
        let body = json!({
            "order_id": "ORD-1",
            "amount": 120000,
            "captured": true,
            "note": null,
        });
        let serde_json::Value::Object(map) = body else {
            unreachable!()
        };
        let fields = flatten_fields(map);

        assert_eq!(fields["order_id"], "ORD-1");
        assert_eq!(fields["amount"], "120000");
        assert_eq!(fields["captured"], "true");
        assert_eq!(fields["note"], "");
    }
}
