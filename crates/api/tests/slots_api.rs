//! HTTP-level tests for fields, slots, admin and cron endpoints.

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, NaiveDate, Utc};
use common::{
    admin_token, body_json, get, player_token, post_json, put_json, seed_field, send, ALICE, BOB,
    CRON_SECRET,
};
use serde_json::json;
use sqlx::PgPool;

fn future_date() -> NaiveDate {
    (Utc::now() + Duration::days(2)).date_naive()
}

fn start_on(date: NaiveDate, hour: u32) -> chrono::DateTime<Utc> {
    date.and_hms_opt(hour, 0, 0).unwrap().and_utc()
}

// ---------------------------------------------------------------------------
// Fields and slots
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn day_view_lists_every_window(pool: PgPool) {
    let field = seed_field(&pool, 60).await;
    let app = common::build_test_app(pool);

    let response = get(
        app,
        &format!("/api/v1/fields/{}/slots?date={}", field.id, future_date()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let slots = json["data"].as_array().unwrap();
    assert_eq!(slots.len(), 14);
    assert_eq!(slots[0]["status"], "available");
    assert!(slots[0].get("locked_by").is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn field_detail_and_unknown_field(pool: PgPool) {
    let field = seed_field(&pool, 60).await;
    let app = common::build_test_app(pool);

    let response = get(app.clone(), &format!("/api/v1/fields/{}", field.id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["slot_duration_minutes"], 60);

    let response = get(app, "/api/v1/fields/999999/slots?date=2030-01-01").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "FIELD_NOT_FOUND");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn locking_requires_a_token(pool: PgPool) {
    let field = seed_field(&pool, 60).await;
    let app = common::build_test_app(pool);

    let response = send(
        app,
        Method::POST,
        "/api/v1/slots/lock",
        None,
        Some(json!({"field_id": field.id, "start_time": start_on(future_date(), 10)})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn second_player_sees_lock_conflict(pool: PgPool) {
    let field = seed_field(&pool, 60).await;
    let app = common::build_test_app(pool);
    let body = json!({"field_id": field.id, "start_time": start_on(future_date(), 10)});

    let first = post_json(app.clone(), "/api/v1/slots/lock", &player_token(ALICE), body.clone()).await;
    assert_eq!(first.status(), StatusCode::OK);
    let slot_id = body_json(first).await["data"]["slot_id"].as_i64().unwrap();

    let second = post_json(app.clone(), "/api/v1/slots/lock", &player_token(BOB), body).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(second).await["code"], "SLOT_LOCKED_BY_OTHER");

    let release = send(
        app.clone(),
        Method::POST,
        &format!("/api/v1/slots/{slot_id}/release"),
        Some(&player_token(ALICE)),
        None,
    )
    .await;
    assert_eq!(release.status(), StatusCode::NO_CONTENT);

    let retry = post_json(
        app,
        "/api/v1/slots/lock",
        &player_token(BOB),
        json!({"field_id": field.id, "slot_id": slot_id}),
    )
    .await;
    assert_eq!(retry.status(), StatusCode::OK);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn lock_request_needs_a_target(pool: PgPool) {
    let field = seed_field(&pool, 60).await;
    let app = common::build_test_app(pool);

    let response = post_json(
        app,
        "/api/v1/slots/lock",
        &player_token(ALICE),
        json!({"field_id": field.id}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn oversized_idempotency_key_is_a_validation_error(pool: PgPool) {
    let field = seed_field(&pool, 60).await;
    let app = common::build_test_app(pool);

    let response = post_json(
        app,
        "/api/v1/bookings",
        &player_token(ALICE),
        json!({"slot_id": 1, "field_id": field.id, "idempotency_key": "k".repeat(129)}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn admin_routes_reject_players(pool: PgPool) {
    let app = common::build_test_app(pool);

    let response = send(
        app,
        Method::GET,
        "/api/v1/admin/consistency",
        Some(&player_token(ALICE)),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn admin_creates_and_closes_a_field(pool: PgPool) {
    let app = common::build_test_app(pool);

    let response = post_json(
        app.clone(),
        "/api/v1/admin/fields",
        &admin_token(),
        json!({
            "name": "Five-a-side",
            "opening_time": "08:00:00",
            "closing_time": "22:00:00",
            "slot_duration_minutes": 60,
            "hourly_price_cents": 90000,
            "deposit_price_cents": 10000,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let field_id = body_json(response).await["data"]["id"].as_i64().unwrap();

    let response = put_json(
        app.clone(),
        &format!("/api/v1/admin/fields/{field_id}/status"),
        &admin_token(),
        json!({"status": "closed"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = post_json(
        app.clone(),
        "/api/v1/slots/lock",
        &player_token(ALICE),
        json!({"field_id": field_id, "start_time": start_on(future_date(), 10)}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "SLOT_UNAVAILABLE");

    let views = body_json(
        get(
            app,
            &format!("/api/v1/fields/{field_id}/slots?date={}", future_date()),
        )
        .await,
    )
    .await;
    assert!(views["data"]
        .as_array()
        .unwrap()
        .iter()
        .all(|v| v["status"] == "unavailable"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn admin_rejects_inverted_schedule(pool: PgPool) {
    let app = common::build_test_app(pool);

    let response = post_json(
        app,
        "/api/v1/admin/fields",
        &admin_token(),
        json!({
            "name": "Backwards",
            "opening_time": "22:00:00",
            "closing_time": "08:00:00",
            "slot_duration_minutes": 60,
            "hourly_price_cents": 90000,
            "deposit_price_cents": 10000,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn admin_blocks_then_releases_a_window(pool: PgPool) {
    let field = seed_field(&pool, 60).await;
    let app = common::build_test_app(pool);

    let response = post_json(
        app.clone(),
        "/api/v1/admin/slots/block",
        &admin_token(),
        json!({"field_id": field.id, "start_time": start_on(future_date(), 12)}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let slot_id = body_json(response).await["data"]["id"].as_i64().unwrap();

    let locked = post_json(
        app.clone(),
        "/api/v1/slots/lock",
        &player_token(ALICE),
        json!({"field_id": field.id, "slot_id": slot_id}),
    )
    .await;
    assert_eq!(locked.status(), StatusCode::CONFLICT);

    let response = send(
        app.clone(),
        Method::POST,
        &format!("/api/v1/admin/slots/{slot_id}/release"),
        Some(&admin_token()),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let locked = post_json(
        app,
        "/api/v1/slots/lock",
        &player_token(ALICE),
        json!({"field_id": field.id, "slot_id": slot_id}),
    )
    .await;
    assert_eq!(locked.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Cron
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn cron_endpoints_require_the_shared_secret(pool: PgPool) {
    let app = common::build_test_app(pool);

    let response = send(
        app.clone(),
        Method::POST,
        "/api/v1/cron/expire-bookings",
        Some("not-the-secret"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(
        app.clone(),
        Method::POST,
        "/api/v1/cron/expire-bookings",
        Some(CRON_SECRET),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["expired_drafts"], 0);

    let response = send(
        app,
        Method::POST,
        "/api/v1/cron/unlock-slots",
        Some(CRON_SECRET),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["expired_locks"], 0);
}
