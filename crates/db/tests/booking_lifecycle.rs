//! Integration tests for booking persistence, limits usage and the
//! consistency query.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use fieldbook_core::booking_limits::{day_bounds, week_bounds};
use fieldbook_core::slot_lock::lock_expiry;
use fieldbook_core::status::{BookingStatus, PaymentStatus};
use fieldbook_db::models::booking::{Booking, NewBooking};
use fieldbook_db::models::field::{CreateField, Field};
use fieldbook_db::models::payment::NewPayment;
use fieldbook_db::models::slot::{NewSlot, Slot};
use fieldbook_db::repositories::{BookingRepo, FieldRepo, PaymentRepo, SlotRepo};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 6, day, h, m, 0).unwrap()
}

async fn seed_field(pool: &PgPool) -> Field {
    FieldRepo::create(
        pool,
        &CreateField {
            name: "Pitch A".to_string(),
            opening_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            closing_time: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            slot_duration_minutes: 60,
            hourly_price_cents: 60_000,
            deposit_price_cents: 0,
            timezone: Some("UTC".to_string()),
            status_id: None,
        },
    )
    .await
    .unwrap()
}

async fn lock_window(
    pool: &PgPool,
    field: &Field,
    user_id: i64,
    start: DateTime<Utc>,
    minutes: i64,
    now: DateTime<Utc>,
) -> Slot {
    let input = NewSlot {
        field_id: field.id,
        start_time: start,
        end_time: start + Duration::minutes(minutes),
        price_cents: 60_000,
        deposit_cents: 0,
    };
    SlotRepo::insert_locked(pool, &input, user_id, lock_expiry(now), now)
        .await
        .unwrap()
        .unwrap()
}

async fn draft(pool: &PgPool, slot: &Slot, user_id: i64, expires_at: DateTime<Utc>) -> Booking {
    let mut tx = pool.begin().await.unwrap();
    let booking = BookingRepo::create_draft_tx(
        &mut tx,
        &NewBooking {
            user_id,
            field_id: slot.field_id,
            slot_id: slot.id,
            total_amount_cents: slot.price_cents,
            expires_at,
            idempotency_key: None,
        },
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();
    booking
}

/// Drive a draft all the way to confirmed.
async fn confirm(pool: &PgPool, booking: &Booking, now: DateTime<Utc>) {
    let order_id = format!("ORD-{}", booking.id);
    let mut tx = pool.begin().await.unwrap();
    assert!(BookingRepo::mark_pending_payment_tx(
        &mut tx,
        booking.id,
        &order_id,
        now + Duration::minutes(30),
        now
    )
    .await
    .unwrap());
    let payment = PaymentRepo::create_tx(
        &mut tx,
        &NewPayment {
            booking_id: booking.id,
            amount_cents: booking.total_amount_cents,
            currency: "INR".to_string(),
            order_id,
            payment_url: None,
            provider_metadata: serde_json::json!({}),
        },
    )
    .await
    .unwrap();
    assert!(PaymentRepo::settle_tx(
        &mut tx,
        payment.id,
        PaymentStatus::Paid,
        Some(&format!("TXN-{}", booking.id)),
        &serde_json::json!({"gateway": "mock"})
    )
    .await
    .unwrap());
    assert!(BookingRepo::settle_tx(
        &mut tx,
        booking.id,
        BookingStatus::PendingPayment,
        BookingStatus::Confirmed,
        PaymentStatus::Paid,
        now
    )
    .await
    .unwrap());
    assert!(SlotRepo::mark_booked_tx(&mut tx, booking.slot_id, booking.user_id)
        .await
        .unwrap());
    tx.commit().await.unwrap();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_second_live_booking_for_slot_is_rejected(pool: PgPool) {
    let field = seed_field(&pool).await;
    let slot = lock_window(&pool, &field, 1, at(4, 18, 0), 60, at(4, 10, 0)).await;
    draft(&pool, &slot, 1, at(4, 10, 10)).await;

    let mut tx = pool.begin().await.unwrap();
    let err = BookingRepo::create_draft_tx(
        &mut tx,
        &NewBooking {
            user_id: 1,
            field_id: field.id,
            slot_id: slot.id,
            total_amount_cents: 1,
            expires_at: at(4, 10, 10),
            idempotency_key: None,
        },
    )
    .await
    .expect_err("partial unique index must fire");
    let constraint = err.as_database_error().and_then(|e| e.constraint());
    assert_eq!(constraint, Some("uq_bookings_active_slot"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_limit_usage_counts_confirmed_and_pending_only(pool: PgPool) {
    let field = seed_field(&pool).await;
    let now = at(4, 9, 0);

    // Confirmed 60 minutes on Tuesday 4 June.
    let slot = lock_window(&pool, &field, 7, at(4, 10, 0), 60, now).await;
    let booking = draft(&pool, &slot, 7, at(4, 9, 10)).await;
    confirm(&pool, &booking, now).await;

    // Draft 60 minutes the same day: not counted.
    let slot = lock_window(&pool, &field, 7, at(4, 12, 0), 60, now).await;
    draft(&pool, &slot, 7, at(4, 9, 10)).await;

    // Confirmed 30 minutes on Thursday 6 June, same week.
    let slot = lock_window(&pool, &field, 7, at(6, 12, 0), 30, now).await;
    let booking = draft(&pool, &slot, 7, at(4, 9, 10)).await;
    confirm(&pool, &booking, now).await;

    // Another player's booking never counts.
    let slot = lock_window(&pool, &field, 8, at(4, 14, 0), 60, now).await;
    let booking = draft(&pool, &slot, 8, at(4, 9, 10)).await;
    confirm(&pool, &booking, now).await;

    let date = NaiveDate::from_ymd_opt(2030, 6, 4).unwrap();
    let usage = BookingRepo::limit_usage(
        &pool,
        7,
        day_bounds(date, chrono_tz::UTC),
        week_bounds(date, chrono_tz::UTC),
    )
    .await
    .unwrap();
    assert_eq!(usage.day_minutes, 60);
    assert_eq!(usage.week_minutes, 90);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_pending_payment_requires_unexpired_draft(pool: PgPool) {
    let field = seed_field(&pool).await;
    let slot = lock_window(&pool, &field, 1, at(4, 18, 0), 60, at(4, 10, 0)).await;
    let booking = draft(&pool, &slot, 1, at(4, 10, 10)).await;

    let mut tx = pool.begin().await.unwrap();
    assert!(!BookingRepo::mark_pending_payment_tx(
        &mut tx,
        booking.id,
        "ORD-LATE",
        at(4, 10, 40),
        at(4, 10, 10)
    )
    .await
    .unwrap());
    tx.commit().await.unwrap();

    let stored = BookingRepo::find_by_id(&pool, booking.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), BookingStatus::Draft);
    assert!(stored.order_id.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_expired_drafts_and_purge(pool: PgPool) {
    let field = seed_field(&pool).await;
    let slot = lock_window(&pool, &field, 1, at(4, 18, 0), 60, at(4, 10, 0)).await;
    let booking = draft(&pool, &slot, 1, at(4, 10, 10)).await;

    assert!(BookingRepo::find_expired_drafts(&pool, at(4, 10, 9), 100)
        .await
        .unwrap()
        .is_empty());
    let expired = BookingRepo::find_expired_drafts(&pool, at(4, 10, 10), 100)
        .await
        .unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, booking.id);

    let mut tx = pool.begin().await.unwrap();
    assert!(BookingRepo::settle_tx(
        &mut tx,
        booking.id,
        BookingStatus::Draft,
        BookingStatus::Expired,
        PaymentStatus::Failed,
        at(4, 10, 11)
    )
    .await
    .unwrap());
    // A second sweep racing the first loses the compare-and-swap.
    assert!(!BookingRepo::settle_tx(
        &mut tx,
        booking.id,
        BookingStatus::Draft,
        BookingStatus::Expired,
        PaymentStatus::Failed,
        at(4, 10, 11)
    )
    .await
    .unwrap());
    tx.commit().await.unwrap();

    assert_eq!(BookingRepo::purge_expired(&pool, at(4, 10, 0)).await.unwrap(), 0);
    assert_eq!(BookingRepo::purge_expired(&pool, at(12, 0, 0)).await.unwrap(), 1);
    assert!(BookingRepo::find_by_id(&pool, booking.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_joint_violations_detects_torn_state(pool: PgPool) {
    let field = seed_field(&pool).await;
    let now = at(4, 10, 0);

    let healthy = lock_window(&pool, &field, 1, at(4, 18, 0), 60, now).await;
    let booking = draft(&pool, &healthy, 1, at(4, 10, 10)).await;
    confirm(&pool, &booking, now).await;

    let torn = lock_window(&pool, &field, 2, at(4, 19, 0), 60, now).await;
    let torn_booking = draft(&pool, &torn, 2, at(4, 10, 10)).await;
    // Booking confirmed without its slot moving: never valid at rest.
    sqlx::query("UPDATE bookings SET status_id = $2, payment_status_id = $3 WHERE id = $1")
        .bind(torn_booking.id)
        .bind(BookingStatus::Confirmed.id())
        .bind(PaymentStatus::Paid.id())
        .execute(&pool)
        .await
        .unwrap();

    let violations = BookingRepo::find_joint_violations(&pool).await.unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].booking_id, torn_booking.id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_relock_after_settlement_is_not_a_violation(pool: PgPool) {
    let field = seed_field(&pool).await;
    let slot = lock_window(&pool, &field, 1, at(4, 18, 0), 60, at(4, 10, 0)).await;
    let booking = draft(&pool, &slot, 1, at(4, 10, 10)).await;

    let mut tx = pool.begin().await.unwrap();
    BookingRepo::settle_tx(
        &mut tx,
        booking.id,
        BookingStatus::Draft,
        BookingStatus::Expired,
        PaymentStatus::Failed,
        at(4, 10, 11),
    )
    .await
    .unwrap();
    SlotRepo::release_tx(&mut tx, slot.id, 1).await.unwrap();
    tx.commit().await.unwrap();

    let fresh = SlotRepo::find_by_id(&pool, slot.id).await.unwrap().unwrap();
    SlotRepo::compare_and_lock(
        &pool,
        slot.id,
        &fresh.observation(),
        2,
        lock_expiry(at(4, 10, 12)),
        at(4, 10, 12),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(BookingRepo::find_joint_violations(&pool).await.unwrap().is_empty());
}
