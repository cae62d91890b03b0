//! Payment gateway abstraction.
//!
//! The reservation engine talks to the provider through [`PaymentGateway`]:
//! create an order, obtain a redirectable payment handle, and verify the
//! signature of inbound callbacks. [`build_gateway`] picks the live HTTP
//! client or the deterministic mock from configuration.

pub mod http;
pub mod mock;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use fieldbook_core::error::ReservationError;
use fieldbook_core::types::{AmountCents, DbId};
use serde::{Deserialize, Serialize};

use crate::config::PaymentConfig;

/// What the engine asks the provider to charge.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub booking_id: DbId,
    pub amount_cents: AmountCents,
    pub currency: String,
    /// Merchant-side reference echoed back by the provider.
    pub receipt: String,
}

/// An order created at the provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayOrder {
    pub order_id: String,
    /// Raw provider fields kept for reconciliation.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Billing details forwarded to the provider's checkout.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BillingDetails {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Errors from a payment provider.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Gateway API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The provider answered with something we could not use.
    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),
}

impl From<GatewayError> for ReservationError {
    fn from(err: GatewayError) -> Self {
        ReservationError::GatewayUnavailable(err.to_string())
    }
}

/// Operations the engine needs from a payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Short name for logs (`"mock"` or `"http"`).
    fn name(&self) -> &'static str;

    /// Create an order for `request`.
    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, GatewayError>;

    /// Exchange an order id for a URL the player is redirected to.
    async fn payment_url(
        &self,
        order_id: &str,
        billing: &BillingDetails,
    ) -> Result<String, GatewayError>;

    /// Check a callback's signature over its fields.
    fn verify_signature(&self, fields: &BTreeMap<String, String>, signature: &str) -> bool;
}

/// Build the gateway for this deployment.
///
/// Credentials present in production select the live client; anything else
/// runs the mock so the booking flow works end to end without a provider.
pub fn build_gateway(config: &PaymentConfig) -> Arc<dyn PaymentGateway> {
    if config.is_live() {
        tracing::info!("Using live payment gateway");
        Arc::new(http::HttpGateway::new(config))
    } else {
        tracing::warn!(app_env = %config.app_env, "Payment gateway running in mock mode");
        Arc::new(mock::MockGateway::new(config.webhook_secret.clone()))
    }
}
