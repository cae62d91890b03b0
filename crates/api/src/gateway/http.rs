//! HTTP client for the live payment provider.
//!
//! Orders are created with `POST {base}/orders` and checkout tokens fetched
//! with `POST {base}/orders/{order_id}/token`, both authenticated with the
//! merchant credentials as HTTP basic auth.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use fieldbook_core::payment_signature;
use serde::Deserialize;

use super::{BillingDetails, GatewayError, GatewayOrder, OrderRequest, PaymentGateway};
use crate::config::PaymentConfig;

/// HTTP request timeout for a single gateway call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Live payment provider client.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    merchant_id: String,
    merchant_key: String,
    webhook_secret: String,
    callback_url: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    payment_url: String,
}

impl HttpGateway {
    /// Build a client from live credentials.
    ///
    /// # Panics
    ///
    /// Panics if the credentials are missing; callers check
    /// [`PaymentConfig::is_live`] first.
    pub fn new(config: &PaymentConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            base_url: config
                .gateway_url
                .clone()
                .expect("PAYMENT_GATEWAY_URL must be set for the live gateway")
                .trim_end_matches('/')
                .to_string(),
            merchant_id: config
                .merchant_id
                .clone()
                .expect("PAYMENT_MERCHANT_ID must be set for the live gateway"),
            merchant_key: config
                .merchant_key
                .clone()
                .expect("PAYMENT_MERCHANT_KEY must be set for the live gateway"),
            webhook_secret: config.webhook_secret.clone(),
            callback_url: config.callback_url.clone(),
        }
    }

    /// Ensure the response has a success status code.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<GatewayOrder, GatewayError> {
        let body = serde_json::json!({
            "amount": request.amount_cents,
            "currency": request.currency,
            "receipt": request.receipt,
            "notes": { "booking_id": request.booking_id },
        });

        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.merchant_id, Some(&self.merchant_key))
            .json(&body)
            .send()
            .await?;

        let order: OrderResponse = Self::ensure_success(response).await?.json().await?;
        if order.id.is_empty() {
            return Err(GatewayError::InvalidResponse("order id is empty".into()));
        }

        Ok(GatewayOrder {
            order_id: order.id,
            metadata: serde_json::Value::Object(order.rest),
        })
    }

    async fn payment_url(
        &self,
        order_id: &str,
        billing: &BillingDetails,
    ) -> Result<String, GatewayError> {
        let body = serde_json::json!({
            "billing": billing,
            "callback_url": self.callback_url,
        });

        let response = self
            .client
            .post(format!("{}/orders/{order_id}/token", self.base_url))
            .basic_auth(&self.merchant_id, Some(&self.merchant_key))
            .json(&body)
            .send()
            .await?;

        let token: TokenResponse = Self::ensure_success(response).await?.json().await?;
        Ok(token.payment_url)
    }

    fn verify_signature(&self, fields: &BTreeMap<String, String>, signature: &str) -> bool {
        payment_signature::verify(&self.webhook_secret, fields, signature)
    }
}
