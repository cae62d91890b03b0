//! Deterministic stand-in for the payment provider.

use std::collections::BTreeMap;

use async_trait::async_trait;
use fieldbook_core::payment_signature;

use super::{BillingDetails, GatewayError, GatewayOrder, OrderRequest, PaymentGateway};

/// Base of the fake checkout URLs.
const MOCK_CHECKOUT_URL: &str = "https://mock-gateway.local/pay";

/// Mock gateway: order ids derive from the booking id, tokens from the
/// order id. Signatures are still real HMACs so callback handling is
/// exercised exactly as in production.
pub struct MockGateway {
    webhook_secret: String,
}

impl MockGateway {
    pub fn new(webhook_secret: String) -> Self {
        Self { webhook_secret }
    }

    /// The order id the mock assigns to a booking.
    pub fn order_id_for(booking_id: i64) -> String {
        format!("MOCK-ORD-{booking_id}")
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, GatewayError> {
        let order_id = Self::order_id_for(request.booking_id);
        tracing::debug!(booking_id = request.booking_id, %order_id, "Mock order created");
        Ok(GatewayOrder {
            order_id,
            metadata: serde_json::json!({
                "mock": true,
                "receipt": request.receipt,
            }),
        })
    }

    async fn payment_url(
        &self,
        order_id: &str,
        _billing: &BillingDetails,
    ) -> Result<String, GatewayError> {
        Ok(format!("{MOCK_CHECKOUT_URL}/MOCK-TOKEN-{order_id}"))
    }

    fn verify_signature(&self, fields: &BTreeMap<String, String>, signature: &str) -> bool {
        payment_signature::verify(&self.webhook_secret, fields, signature)
    }
}
