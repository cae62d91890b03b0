//! Payment initiation and callback completion.
//!
//! Initiation talks to the gateway before touching any row, so a provider
//! outage leaves the draft untouched and retryable. Completion applies the
//! callback to payment, booking and slot in one transaction and publishes
//! the outcome only after commit.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use fieldbook_core::booking_state::require_status;
use fieldbook_core::error::{CoreError, ReservationError};
use fieldbook_core::idempotency::{generate_key, OP_INITIATE_PAYMENT};
use fieldbook_core::slot_lock::is_live_lock;
use fieldbook_core::status::{BookingStatus, PaymentStatus};
use fieldbook_core::types::{AmountCents, DbId, Timestamp};
use fieldbook_db::models::payment::NewPayment;
use fieldbook_db::repositories::{BookingRepo, PaymentRepo, SlotRepo};
use fieldbook_events::bus::event_types;
use fieldbook_events::PlatformEvent;
use serde::{Deserialize, Serialize};

use super::idempotency::{self, Begin};
use super::settle_booking_tx;
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::gateway::{BillingDetails, OrderRequest};
use crate::state::AppState;

/// The request fields covered by the idempotency hash.
#[derive(Debug, Clone, Serialize)]
pub struct InitiatePayment {
    pub booking_id: DbId,
    pub amount_cents: AmountCents,
    pub billing: BillingDetails,
}

/// Where to send the player to pay; stored verbatim for replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInitiated {
    pub booking_id: DbId,
    pub order_id: String,
    pub payment_url: String,
    pub amount_cents: AmountCents,
    pub currency: String,
    /// The booking is abandoned if no callback arrives by then.
    pub pay_by: Timestamp,
}

/// A verified provider callback.
#[derive(Debug, Clone)]
pub struct PaymentCallback {
    pub order_id: String,
    pub transaction_id: Option<String>,
    pub success: bool,
    pub amount_cents: AmountCents,
    pub currency: String,
    /// Every field as received, kept on the payment row.
    pub provider_fields: BTreeMap<String, String>,
}

/// Acknowledgement returned to the provider.
#[derive(Debug, Clone, Serialize)]
pub struct CallbackAck {
    pub booking_id: DbId,
    pub order_id: String,
    pub booking_status: BookingStatus,
    pub payment_status: PaymentStatus,
}

impl PaymentCallback {
    /// Read the typed fields out of a callback's flat field map.
    pub fn from_fields(fields: BTreeMap<String, String>) -> AppResult<Self> {
        let required = |name: &str| {
            fields
                .get(name)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| AppError::BadRequest(format!("Callback is missing '{name}'")))
        };

        let order_id = required("order_id")?;
        let currency = required("currency")?;
        let amount_cents = required("amount")?
            .parse::<AmountCents>()
            .map_err(|_| AppError::BadRequest("Callback amount is not an integer".into()))?;
        let success = match required("status")?.to_ascii_lowercase().as_str() {
            "success" | "paid" | "captured" => true,
            "failure" | "failed" | "cancelled" => false,
            other => {
                return Err(AppError::BadRequest(format!(
                    "Unknown callback status '{other}'"
                )))
            }
        };
        let transaction_id = fields.get("transaction_id").filter(|v| !v.is_empty()).cloned();

        Ok(Self {
            order_id,
            transaction_id,
            success,
            amount_cents,
            currency,
            provider_fields: fields,
        })
    }
}

/// Start paying for a draft booking.
pub async fn initiate_payment(
    state: &AppState,
    user_id: DbId,
    input: &InitiatePayment,
    idempotency_key: Option<&str>,
    now: Timestamp,
) -> AppResult<PaymentInitiated> {
    let pool = &state.pool;
    let claim = match idempotency_key {
        Some(key) => match idempotency::begin(pool, key, user_id, OP_INITIATE_PAYMENT, input, now).await? {
            Begin::Replay(response) => return idempotency::decode_replay(response),
            Begin::Proceed(claim) => Some(claim),
        },
        None => None,
    };

    let result = start_payment(state, user_id, input, now).await;
    idempotency::finish(pool, claim, &result, now).await;
    result
}

async fn start_payment(
    state: &AppState,
    user_id: DbId,
    input: &InitiatePayment,
    now: Timestamp,
) -> AppResult<PaymentInitiated> {
    let pool = &state.pool;
    let booking_id = input.booking_id;

    let booking = BookingRepo::find_by_id(pool, booking_id)
        .await?
        .ok_or(ReservationError::BookingNotFound(booking_id))?;
    if booking.user_id != user_id {
        return Err(ReservationError::BookingNotOwned.into());
    }
    require_status(booking.status(), BookingStatus::Draft)?;
    if booking.expires_at <= now {
        return Err(ReservationError::BookingExpired.into());
    }

    let slot = SlotRepo::find_by_id(pool, booking.slot_id)
        .await?
        .ok_or(ReservationError::SlotNotFound)?;
    let observation = slot.observation();
    if !is_live_lock(&observation, now) || observation.owner != Some(user_id) {
        return Err(ReservationError::SlotLockExpired.into());
    }

    if PaymentRepo::has_paid_for_booking(pool, booking_id).await? {
        return Err(ReservationError::PaymentAlreadyProcessed.into());
    }
    if input.amount_cents != booking.total_amount_cents {
        return Err(ReservationError::PaymentAmountMismatch {
            expected: booking.total_amount_cents,
            actual: input.amount_cents,
        }
        .into());
    }

    let payment_config = &state.config.payment;
    let order = state
        .gateway
        .create_order(&OrderRequest {
            booking_id,
            amount_cents: booking.total_amount_cents,
            currency: payment_config.currency.clone(),
            receipt: generate_key(&format!("bk{booking_id}"), now),
        })
        .await
        .map_err(|e| {
            tracing::warn!(booking_id, gateway = state.gateway.name(), error = %e, "Order creation failed");
            ReservationError::from(e)
        })?;
    let payment_url = state
        .gateway
        .payment_url(&order.order_id, &input.billing)
        .await
        .map_err(|e| {
            tracing::warn!(booking_id, order_id = %order.order_id, error = %e, "Payment token request failed");
            ReservationError::from(e)
        })?;

    // The gateway round trip can outlive the draft or its lock, so the
    // deadlines are checked again at a fresh instant.
    let checked_at = now.max(Utc::now());
    let pay_by = checked_at + Duration::minutes(payment_config.timeout_mins);

    let mut tx = pool.begin().await?;

    let locked = BookingRepo::find_by_id_for_update_tx(&mut tx, booking_id)
        .await?
        .ok_or(ReservationError::BookingNotFound(booking_id))?;
    require_status(locked.status(), BookingStatus::Draft)?;
    if locked.expires_at <= checked_at {
        return Err(ReservationError::BookingExpired.into());
    }

    PaymentRepo::create_tx(
        &mut tx,
        &NewPayment {
            booking_id,
            amount_cents: booking.total_amount_cents,
            currency: payment_config.currency.clone(),
            order_id: order.order_id.clone(),
            payment_url: Some(payment_url.clone()),
            provider_metadata: order.metadata.clone(),
        },
    )
    .await
    .map_err(|e| {
        if is_unique_violation(&e, "uq_payments_order_id") {
            ReservationError::DuplicatePayment.into()
        } else {
            AppError::from(e)
        }
    })?;

    if !BookingRepo::mark_pending_payment_tx(&mut tx, booking_id, &order.order_id, pay_by, checked_at).await? {
        return Err(ReservationError::BookingInvalidState {
            expected: BookingStatus::Draft,
            actual: locked.status(),
        }
        .into());
    }
    if !SlotRepo::extend_lock_tx(&mut tx, booking.slot_id, user_id, pay_by, checked_at).await? {
        return Err(ReservationError::SlotLockExpired.into());
    }

    tx.commit().await?;

    tracing::info!(
        booking_id,
        order_id = %order.order_id,
        user_id,
        gateway = state.gateway.name(),
        "Payment initiated"
    );

    Ok(PaymentInitiated {
        booking_id,
        order_id: order.order_id,
        payment_url,
        amount_cents: booking.total_amount_cents,
        currency: payment_config.currency.clone(),
        pay_by,
    })
}

/// Apply a verified callback to payment, booking and slot.
pub async fn complete_booking(
    state: &AppState,
    callback: &PaymentCallback,
    now: Timestamp,
) -> AppResult<CallbackAck> {
    let order_id = callback.order_id.as_str();
    let mut tx = state.pool.begin().await?;

    let payment = PaymentRepo::find_by_order_id_for_update_tx(&mut tx, order_id)
        .await?
        .ok_or_else(|| ReservationError::PaymentNotFound(order_id.to_string()))?;

    if let Some(transaction_id) = callback.transaction_id.as_deref() {
        if let Some(other) = PaymentRepo::find_by_transaction_id_tx(&mut tx, transaction_id).await? {
            if other.id != payment.id {
                return Err(ReservationError::DuplicatePayment.into());
            }
        }
    }

    let booking = BookingRepo::find_by_id_for_update_tx(&mut tx, payment.booking_id)
        .await?
        .ok_or(ReservationError::BookingNotFound(payment.booking_id))?;

    if payment.status() == PaymentStatus::Paid {
        return Err(ReservationError::PaymentAlreadyProcessed.into());
    }
    if booking.status() != BookingStatus::PendingPayment {
        if callback.success {
            tracing::error!(
                booking_id = booking.id,
                order_id,
                booking_status = %booking.status(),
                "Successful payment for a booking that is no longer awaiting it; refund required"
            );
        } else if payment.status().is_settled() {
            return Err(ReservationError::PaymentAlreadyProcessed.into());
        }
        return Err(ReservationError::BookingInvalidState {
            expected: BookingStatus::PendingPayment,
            actual: booking.status(),
        }
        .into());
    }
    if payment.status().is_settled() {
        return Err(ReservationError::PaymentAlreadyProcessed.into());
    }

    if callback.amount_cents != payment.amount_cents
        || !callback.currency.eq_ignore_ascii_case(&payment.currency)
    {
        return Err(ReservationError::PaymentAmountMismatch {
            expected: payment.amount_cents,
            actual: callback.amount_cents,
        }
        .into());
    }

    let metadata = serde_json::to_value(&callback.provider_fields)
        .map_err(|e| AppError::Core(CoreError::Internal(e.to_string())))?;
    let transaction_id = callback.transaction_id.as_deref();

    let (booking_status, payment_status) = if callback.success {
        if SlotRepo::mark_booked_tx(&mut tx, booking.slot_id, booking.user_id).await? {
            (BookingStatus::Confirmed, PaymentStatus::Paid)
        } else {
            tracing::error!(
                booking_id = booking.id,
                order_id,
                slot_id = booking.slot_id,
                "Payment succeeded but the slot is no longer held; failing booking, refund required"
            );
            (BookingStatus::Failed, PaymentStatus::Failed)
        }
    } else {
        SlotRepo::release_tx(&mut tx, booking.slot_id, booking.user_id).await?;
        (BookingStatus::Failed, PaymentStatus::Failed)
    };

    if !PaymentRepo::settle_tx(&mut tx, payment.id, payment_status, transaction_id, &metadata).await? {
        return Err(ReservationError::PaymentAlreadyProcessed.into());
    }
    settle_booking_tx(
        &mut tx,
        booking.id,
        BookingStatus::PendingPayment,
        booking_status,
        payment_status,
        now,
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        booking_id = booking.id,
        order_id,
        %booking_status,
        "Payment callback applied"
    );

    let event_type = match booking_status {
        BookingStatus::Confirmed => event_types::BOOKING_CONFIRMED,
        _ => event_types::BOOKING_FAILED,
    };
    state.event_bus.publish(
        PlatformEvent::new(event_type)
            .for_booking(booking.id)
            .notify(booking.user_id)
            .with_payload(serde_json::json!({
                "order_id": order_id,
                "transaction_id": transaction_id,
                "amount_cents": payment.amount_cents,
            })),
    );

    Ok(CallbackAck {
        booking_id: booking.id,
        order_id: order_id.to_string(),
        booking_status,
        payment_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_a_success_callback() {
        let callback = PaymentCallback::from_fields(fields(&[
            ("order_id", "ORD-1"),
            ("transaction_id", "TXN-1"),
            ("status", "success"),
            ("amount", "120000"),
            ("currency", "INR"),
            ("method", "upi"),
        ]))
        .unwrap();

        assert!(callback.success);
        assert_eq!(callback.amount_cents, 120_000);
        assert_eq!(callback.transaction_id.as_deref(), Some("TXN-1"));
        assert_eq!(callback.provider_fields.get("method").map(String::as_str), Some("upi"));
    }

    #[test]
    fn failure_status_and_missing_transaction() {
        let callback = PaymentCallback::from_fields(fields(&[
            ("order_id", "ORD-1"),
            ("status", "FAILED"),
            ("amount", "5"),
            ("currency", "INR"),
        ]))
        .unwrap();
        assert!(!callback.success);
        assert_eq!(callback.transaction_id, None);
    }

    #[test]
    fn rejects_malformed_callbacks() {
        assert_matches!(
            PaymentCallback::from_fields(fields(&[("status", "success")])),
            Err(AppError::BadRequest(_))
        );
        assert_matches!(
            PaymentCallback::from_fields(fields(&[
                ("order_id", "ORD-1"),
                ("status", "success"),
                ("amount", "12.5"),
                ("currency", "INR"),
            ])),
            Err(AppError::BadRequest(_))
        );
        assert_matches!(
            PaymentCallback::from_fields(fields(&[
                ("order_id", "ORD-1"),
                ("status", "pending"),
                ("amount", "1"),
                ("currency", "INR"),
            ])),
            Err(AppError::BadRequest(_))
        );
    }
}
