#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use chrono::{NaiveTime, TimeZone, Utc};
use fieldbook_core::roles::{ROLE_ADMIN, ROLE_PLAYER};
use fieldbook_core::types::{DbId, Timestamp};
use fieldbook_db::models::field::{CreateField, Field};
use fieldbook_db::repositories::FieldRepo;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use fieldbook_api::auth::jwt::{generate_access_token, JwtConfig};
use fieldbook_api::config::{PaymentConfig, ReaperConfig, ServerConfig};
use fieldbook_api::gateway::mock::MockGateway;
use fieldbook_api::router::build_app_router;
use fieldbook_api::state::AppState;

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const CRON_SECRET: &str = "test-cron-secret";

pub const ALICE: DbId = 101;
pub const BOB: DbId = 102;
pub const ADMIN: DbId = 900;

/// Build a test `ServerConfig` with safe defaults and a mock gateway.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        jwt: JwtConfig {
            secret: "test-jwt-secret".to_string(),
            access_token_expiry_mins: 15,
        },
        cron_secret: CRON_SECRET.to_string(),
        reaper: ReaperConfig {
            enabled: false,
            interval_secs: 60,
        },
        payment: PaymentConfig {
            app_env: "test".to_string(),
            gateway_url: None,
            merchant_id: None,
            merchant_key: None,
            webhook_secret: WEBHOOK_SECRET.to_string(),
            currency: "INR".to_string(),
            callback_url: "http://localhost/api/v1/payments/webhook".to_string(),
            timeout_mins: 30,
        },
    }
}

/// Application state over `pool` with a mock gateway and a fresh event bus.
pub fn build_test_state(pool: PgPool) -> AppState {
    AppState {
        pool,
        config: Arc::new(test_config()),
        event_bus: Arc::new(fieldbook_events::EventBus::default()),
        gateway: Arc::new(MockGateway::new(WEBHOOK_SECRET.to_string())),
    }
}

/// Build the full application router, exactly as `main.rs` does.
pub fn build_test_app(pool: PgPool) -> Router {
    let config = test_config();
    build_app_router(build_test_state(pool), &config)
}

pub fn token_for(user_id: DbId, role: &str) -> String {
    generate_access_token(user_id, role, &test_config().jwt).unwrap()
}

pub fn player_token(user_id: DbId) -> String {
    token_for(user_id, ROLE_PLAYER)
}

pub fn admin_token() -> String {
    token_for(ADMIN, ROLE_ADMIN)
}

/// A fixed instant on a fixed future day, for engine-level tests.
pub fn at(day: u32, h: u32, m: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2030, 6, day, h, m, 0).unwrap()
}

/// Insert an open UTC field with the given slot length, 08:00 to 22:00.
pub async fn seed_field(pool: &PgPool, slot_duration_minutes: i32) -> Field {
    FieldRepo::create(
        pool,
        &CreateField {
            name: format!("Pitch {slot_duration_minutes}"),
            opening_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            closing_time: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            slot_duration_minutes,
            hourly_price_cents: 120_000,
            deposit_price_cents: 20_000,
            timezone: None,
            status_id: None,
        },
    )
    .await
    .unwrap()
}

/// Sign callback fields with the test webhook secret.
pub fn signed(fields: &BTreeMap<String, String>) -> String {
    fieldbook_core::payment_signature::sign(WEBHOOK_SECRET, fields)
}

pub fn callback_fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    send(app, Method::GET, uri, None, None).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response {
    send(app, Method::GET, uri, Some(token), None).await
}

pub async fn post_json(app: Router, uri: &str, token: &str, body: serde_json::Value) -> Response {
    send(app, Method::POST, uri, Some(token), Some(body)).await
}

pub async fn put_json(app: Router, uri: &str, token: &str, body: serde_json::Value) -> Response {
    send(app, Method::PUT, uri, Some(token), Some(body)).await
}
