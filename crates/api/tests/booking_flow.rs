//! Engine-level tests of slot projection, locking and draft creation.
//!
//! Every call takes an explicit `now`, so the scenarios run on a fixed
//! calendar regardless of the wall clock.

mod common;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use common::{at, seed_field, ALICE, BOB};
use fieldbook_api::engine::booking::{self, BookingCreated, CreateBooking};
use fieldbook_api::engine::lock_manager::{self, SlotTarget};
use fieldbook_api::engine::payment::{self, InitiatePayment};
use fieldbook_api::engine::reaper;
use fieldbook_api::engine::slot_generator::generate_slots_for_day;
use fieldbook_api::error::AppError;
use fieldbook_api::gateway::BillingDetails;
use fieldbook_core::error::{CoreError, ReservationError};
use fieldbook_core::status::{BookingStatus, FieldStatus, PaymentStatus, SlotStatus};
use fieldbook_core::types::{DbId, Timestamp};
use fieldbook_db::repositories::{BookingRepo, FieldRepo, PaymentRepo, SlotRepo};
use fieldbook_events::EventBus;
use sqlx::PgPool;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 6, d).unwrap()
}

async fn lock_at(pool: &PgPool, field_id: DbId, start: Timestamp, user: DbId, now: Timestamp) -> DbId {
    lock_manager::lock_slot(pool, field_id, SlotTarget::Virtual { start_time: start }, user, now)
        .await
        .unwrap()
        .slot_id
}

async fn draft(
    pool: &PgPool,
    field_id: DbId,
    slot_id: DbId,
    user: DbId,
    key: Option<&str>,
    now: Timestamp,
) -> Result<BookingCreated, AppError> {
    booking::create_booking(
        pool,
        &EventBus::default(),
        user,
        &CreateBooking { slot_id, field_id },
        key,
        now,
    )
    .await
}

// ---------------------------------------------------------------------------
// Slot projection
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn hourly_field_projects_fourteen_windows(pool: PgPool) {
    let field = seed_field(&pool, 60).await;

    let views = generate_slots_for_day(&pool, field.id, day(4), at(3, 12, 0))
        .await
        .unwrap();

    assert_eq!(views.len(), 14);
    assert_eq!(views[0].start_time, at(4, 8, 0));
    assert_eq!(views[13].end_time, at(4, 22, 0));
    assert!(views.iter().all(|v| v.status == SlotStatus::Available));
    assert!(views.iter().all(|v| v.slot_id.is_none()));
    assert!(views.iter().all(|v| v.price_cents == 120_000));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn started_windows_are_hidden_and_locks_show(pool: PgPool) {
    let field = seed_field(&pool, 60).await;
    let now = at(4, 12, 30);
    let slot_id = lock_at(&pool, field.id, at(4, 15, 0), ALICE, now).await;

    let views = generate_slots_for_day(&pool, field.id, day(4), now).await.unwrap();

    // 13:00 through 21:00.
    assert_eq!(views.len(), 9);
    let locked = views.iter().find(|v| v.slot_id == Some(slot_id)).unwrap();
    assert_eq!(locked.status, SlotStatus::TemporarilyLocked);
    assert!(locked.needs_confirmation);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_field_is_not_found(pool: PgPool) {
    let result = generate_slots_for_day(&pool, 424_242, day(4), at(3, 12, 0)).await;
    assert_matches!(
        result,
        Err(AppError::Reservation(ReservationError::FieldNotFound(424_242)))
    );
}

// ---------------------------------------------------------------------------
// Locks
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn expired_lock_passes_to_the_next_player(pool: PgPool) {
    let field = seed_field(&pool, 60).await;
    let start = at(4, 18, 0);

    let slot_id = lock_at(&pool, field.id, start, ALICE, at(4, 10, 0)).await;

    let blocked = lock_manager::lock_slot(&pool, field.id, SlotTarget::Persisted(slot_id), BOB, at(4, 10, 3)).await;
    assert_matches!(
        blocked,
        Err(AppError::Reservation(ReservationError::SlotLockedByOther))
    );

    let taken = lock_manager::lock_slot(&pool, field.id, SlotTarget::Persisted(slot_id), BOB, at(4, 10, 6))
        .await
        .unwrap();
    assert!(taken.locked);
    assert!(!taken.extended);
    assert_eq!(taken.lock_expires_at, at(4, 10, 11));

    let late = draft(&pool, field.id, slot_id, ALICE, None, at(4, 10, 7)).await;
    assert_matches!(
        late,
        Err(AppError::Reservation(ReservationError::SlotLockedByOther))
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_lock_requests_have_one_winner(pool: PgPool) {
    let field = seed_field(&pool, 60).await;
    let now = at(4, 10, 0);

    let attempts = (1..=8).map(|user| {
        let pool = pool.clone();
        let field_id = field.id;
        async move {
            lock_manager::lock_slot(
                &pool,
                field_id,
                SlotTarget::Virtual { start_time: at(4, 18, 0) },
                user,
                now,
            )
            .await
        }
    });
    let results = futures::future::join_all(attempts).await;

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert_matches!(
            result,
            Err(AppError::Reservation(ReservationError::SlotLockedByOther))
        );
    }

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM slots")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn relocking_own_slot_extends(pool: PgPool) {
    let field = seed_field(&pool, 60).await;
    let slot_id = lock_at(&pool, field.id, at(4, 18, 0), ALICE, at(4, 10, 0)).await;

    let again = lock_manager::lock_slot(
        &pool,
        field.id,
        SlotTarget::Virtual { start_time: at(4, 18, 0) },
        ALICE,
        at(4, 10, 2),
    )
    .await
    .unwrap();

    assert_eq!(again.slot_id, slot_id);
    assert!(again.extended);
    assert_eq!(again.lock_expires_at, at(4, 10, 7));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn started_or_misaligned_windows_cannot_be_locked(pool: PgPool) {
    let field = seed_field(&pool, 60).await;

    let started = lock_manager::lock_slot(
        &pool,
        field.id,
        SlotTarget::Virtual { start_time: at(4, 9, 0) },
        ALICE,
        at(4, 9, 30),
    )
    .await;
    assert_matches!(
        started,
        Err(AppError::Reservation(ReservationError::SlotAlreadyStarted))
    );

    let misaligned = lock_manager::lock_slot(
        &pool,
        field.id,
        SlotTarget::Virtual { start_time: at(4, 9, 15) },
        ALICE,
        at(4, 7, 0),
    )
    .await;
    assert_matches!(
        misaligned,
        Err(AppError::Reservation(ReservationError::SlotNotFound))
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn closed_field_refuses_locks(pool: PgPool) {
    let field = seed_field(&pool, 60).await;
    FieldRepo::set_status(&pool, field.id, FieldStatus::Closed)
        .await
        .unwrap();

    let result = lock_manager::lock_slot(
        &pool,
        field.id,
        SlotTarget::Virtual { start_time: at(4, 18, 0) },
        ALICE,
        at(4, 10, 0),
    )
    .await;
    assert_matches!(
        result,
        Err(AppError::Reservation(ReservationError::SlotUnavailable))
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn release_is_refused_while_a_draft_holds_the_slot(pool: PgPool) {
    let field = seed_field(&pool, 60).await;
    let slot_id = lock_at(&pool, field.id, at(4, 18, 0), ALICE, at(4, 10, 0)).await;

    lock_manager::release_slot(&pool, slot_id, ALICE).await.unwrap();
    // Already available: a second release is a no-op.
    lock_manager::release_slot(&pool, slot_id, ALICE).await.unwrap();

    let slot_id = lock_at(&pool, field.id, at(4, 18, 0), ALICE, at(4, 10, 1)).await;
    draft(&pool, field.id, slot_id, ALICE, None, at(4, 10, 2))
        .await
        .unwrap();

    assert_matches!(
        lock_manager::release_slot(&pool, slot_id, ALICE).await,
        Err(AppError::Core(CoreError::Conflict(_)))
    );
    assert_matches!(
        lock_manager::release_slot(&pool, slot_id, BOB).await,
        Err(AppError::Reservation(ReservationError::SlotLockedByOther))
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn admin_block_takes_window_out_of_sale(pool: PgPool) {
    let field = seed_field(&pool, 60).await;
    let now = at(4, 7, 0);

    let blocked = lock_manager::block_slot(&pool, field.id, at(4, 12, 0), now)
        .await
        .unwrap();
    assert_eq!(blocked.status(), SlotStatus::Unavailable);

    let result = lock_manager::lock_slot(
        &pool,
        field.id,
        SlotTarget::Persisted(blocked.id),
        ALICE,
        now,
    )
    .await;
    assert_matches!(
        result,
        Err(AppError::Reservation(ReservationError::SlotUnavailable))
    );

    lock_manager::admin_release(&pool, blocked.id).await.unwrap();
    lock_manager::lock_slot(&pool, field.id, SlotTarget::Persisted(blocked.id), ALICE, now)
        .await
        .unwrap();
}

// ---------------------------------------------------------------------------
// Drafts
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn draft_extends_lock_and_flags_short_notice(pool: PgPool) {
    let field = seed_field(&pool, 60).await;

    let soon = lock_at(&pool, field.id, at(4, 12, 0), ALICE, at(4, 10, 0)).await;
    let created = draft(&pool, field.id, soon, ALICE, None, at(4, 10, 0))
        .await
        .unwrap();
    assert_eq!(created.status, BookingStatus::Draft);
    assert_eq!(created.total_amount_cents, 120_000);
    assert_eq!(created.expires_at, at(4, 10, 10));
    assert!(created.needs_confirmation);

    let slot = SlotRepo::find_by_id(&pool, soon).await.unwrap().unwrap();
    assert_eq!(slot.lock_expires_at, Some(at(4, 10, 10)));

    let later = lock_at(&pool, field.id, at(6, 10, 0), BOB, at(4, 10, 0)).await;
    let created = draft(&pool, field.id, later, BOB, None, at(4, 10, 0))
        .await
        .unwrap();
    assert!(!created.needs_confirmation);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn second_draft_on_the_same_slot_is_refused(pool: PgPool) {
    let field = seed_field(&pool, 60).await;
    let slot_id = lock_at(&pool, field.id, at(4, 18, 0), ALICE, at(4, 10, 0)).await;

    draft(&pool, field.id, slot_id, ALICE, None, at(4, 10, 1))
        .await
        .unwrap();
    let again = draft(&pool, field.id, slot_id, ALICE, None, at(4, 10, 2)).await;

    assert_matches!(
        again,
        Err(AppError::Reservation(ReservationError::SlotAlreadyBooked))
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn draft_without_lock_is_refused(pool: PgPool) {
    let field = seed_field(&pool, 60).await;
    let slot_id = lock_at(&pool, field.id, at(4, 18, 0), ALICE, at(4, 10, 0)).await;

    let expired = draft(&pool, field.id, slot_id, ALICE, None, at(4, 10, 5)).await;
    assert_matches!(
        expired,
        Err(AppError::Reservation(ReservationError::SlotLockExpired))
    );

    let wrong_field = draft(&pool, field.id + 1, slot_id, ALICE, None, at(4, 10, 1)).await;
    assert_matches!(wrong_field, Err(AppError::Reservation(_)));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn idempotent_create_replays_the_first_response(pool: PgPool) {
    let field = seed_field(&pool, 60).await;
    let slot_id = lock_at(&pool, field.id, at(4, 18, 0), ALICE, at(4, 10, 0)).await;
    let other_slot = lock_at(&pool, field.id, at(4, 19, 0), ALICE, at(4, 10, 0)).await;

    let first = draft(&pool, field.id, slot_id, ALICE, Some("bk-1"), at(4, 10, 1))
        .await
        .unwrap();
    let replay = draft(&pool, field.id, slot_id, ALICE, Some("bk-1"), at(4, 10, 2))
        .await
        .unwrap();
    assert_eq!(first, replay);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    let changed = draft(&pool, field.id, other_slot, ALICE, Some("bk-1"), at(4, 10, 3)).await;
    assert_matches!(
        changed,
        Err(AppError::Reservation(ReservationError::DuplicateRequestConflict))
    );

    let stolen = draft(&pool, field.id, slot_id, BOB, Some("bk-1"), at(4, 10, 3)).await;
    assert_matches!(
        stolen,
        Err(AppError::Reservation(ReservationError::IdempotencyKeyMisuse))
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn failed_create_gives_the_key_back(pool: PgPool) {
    let field = seed_field(&pool, 60).await;
    let slot_id = lock_at(&pool, field.id, at(4, 18, 0), ALICE, at(4, 10, 0)).await;

    let expired = draft(&pool, field.id, slot_id, ALICE, Some("bk-2"), at(4, 10, 6)).await;
    assert_matches!(
        expired,
        Err(AppError::Reservation(ReservationError::SlotLockExpired))
    );

    lock_manager::lock_slot(&pool, field.id, SlotTarget::Persisted(slot_id), ALICE, at(4, 10, 7))
        .await
        .unwrap();
    draft(&pool, field.id, slot_id, ALICE, Some("bk-2"), at(4, 10, 8))
        .await
        .unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn daily_limit_counts_pending_payments(pool: PgPool) {
    let state = common::build_test_state(pool.clone());
    let long = seed_field(&pool, 90).await;
    let hour = seed_field(&pool, 60).await;
    let half = seed_field(&pool, 30).await;
    let now = at(3, 10, 0);

    let slot_id = lock_at(&pool, long.id, at(4, 8, 0), ALICE, now).await;
    let created = draft(&pool, long.id, slot_id, ALICE, None, now).await.unwrap();
    assert_eq!(created.total_amount_cents, 180_000);

    payment::initiate_payment(
        &state,
        ALICE,
        &InitiatePayment {
            booking_id: created.booking_id,
            amount_cents: created.total_amount_cents,
            billing: BillingDetails::default(),
        },
        None,
        now,
    )
    .await
    .unwrap();

    let hour_slot = lock_at(&pool, hour.id, at(4, 10, 0), ALICE, now).await;
    let over = draft(&pool, hour.id, hour_slot, ALICE, None, now).await;
    assert_matches!(
        over,
        Err(AppError::Reservation(ReservationError::BookingLimitExceeded(_)))
    );

    let half_slot = lock_at(&pool, half.id, at(4, 10, 0), ALICE, now).await;
    draft(&pool, half.id, half_slot, ALICE, None, now)
        .await
        .unwrap();

    // Another day is a fresh daily budget.
    let next_day = lock_at(&pool, hour.id, at(5, 10, 0), ALICE, now).await;
    draft(&pool, hour.id, next_day, ALICE, None, now)
        .await
        .unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn cancel_frees_the_slot(pool: PgPool) {
    let field = seed_field(&pool, 60).await;
    let events = EventBus::default();
    let mut rx = events.subscribe();
    let slot_id = lock_at(&pool, field.id, at(4, 18, 0), ALICE, at(4, 10, 0)).await;
    let created = draft(&pool, field.id, slot_id, ALICE, None, at(4, 10, 1))
        .await
        .unwrap();

    assert_matches!(
        booking::cancel_booking(&pool, &events, created.booking_id, BOB, at(4, 10, 2)).await,
        Err(AppError::Reservation(ReservationError::BookingNotOwned))
    );

    let cancelled = booking::cancel_booking(&pool, &events, created.booking_id, ALICE, at(4, 10, 2))
        .await
        .unwrap();
    assert_eq!(cancelled.status(), BookingStatus::Cancelled);
    assert_eq!(cancelled.payment_status(), PaymentStatus::Refunded);

    let slot = SlotRepo::find_by_id(&pool, slot_id).await.unwrap().unwrap();
    assert_eq!(slot.status(), SlotStatus::Available);
    assert_eq!(slot.locked_by, None);

    let event = rx.recv().await.unwrap();
    assert_eq!(event.event_type, "booking.cancelled");
    assert_eq!(event.target_user_id, Some(ALICE));

    // The slot is immediately bookable by someone else.
    lock_manager::lock_slot(&pool, field.id, SlotTarget::Persisted(slot_id), BOB, at(4, 10, 3))
        .await
        .unwrap();

    let again = booking::cancel_booking(&pool, &events, created.booking_id, ALICE, at(4, 10, 4)).await;
    assert_matches!(
        again,
        Err(AppError::Reservation(ReservationError::BookingInvalidState { .. }))
    );

    let stored = BookingRepo::find_by_id(&pool, created.booking_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.settled_at, Some(at(4, 10, 2)));
}

// ---------------------------------------------------------------------------
// Lock handover over an unswept booking
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn lapsed_draft_gives_way_to_the_new_lock_owner(pool: PgPool) {
    let field = seed_field(&pool, 60).await;
    let events = EventBus::default();
    let mut rx = events.subscribe();

    let slot_id = lock_at(&pool, field.id, at(4, 18, 0), ALICE, at(4, 10, 0)).await;
    let stale = draft(&pool, field.id, slot_id, ALICE, None, at(4, 10, 0))
        .await
        .unwrap();

    // 10:11: the draft lapsed at 10:10 and no sweep has run yet.
    let lock = lock_manager::lock_slot(&pool, field.id, SlotTarget::Persisted(slot_id), BOB, at(4, 10, 11))
        .await
        .unwrap();
    assert!(lock.locked);
    assert!(!lock.extended);

    let fresh = booking::create_booking(
        &pool,
        &events,
        BOB,
        &CreateBooking {
            slot_id,
            field_id: field.id,
        },
        None,
        at(4, 10, 11),
    )
    .await
    .unwrap();
    assert_eq!(fresh.status, BookingStatus::Draft);

    let old = BookingRepo::find_by_id(&pool, stale.booking_id).await.unwrap().unwrap();
    assert_eq!(old.status(), BookingStatus::Expired);
    assert_eq!(old.payment_status(), PaymentStatus::Failed);
    assert_eq!(old.settled_at, Some(at(4, 10, 11)));

    let expired_event = rx.recv().await.unwrap();
    assert_eq!(expired_event.event_type, "booking.expired");
    assert_eq!(expired_event.target_user_id, Some(ALICE));
    let created_event = rx.recv().await.unwrap();
    assert_eq!(created_event.event_type, "booking.created");
    assert_eq!(created_event.target_user_id, Some(BOB));

    assert!(reaper::check_consistency(&pool).await.unwrap().is_empty());

    // A late sweep neither touches the settled draft nor frees Bob's slot.
    let report = reaper::expire_bookings(&pool, &events, 30, at(4, 10, 12)).await.unwrap();
    assert_eq!(report.expired_drafts, 0);
    let slot = SlotRepo::find_by_id(&pool, slot_id).await.unwrap().unwrap();
    assert_eq!(slot.status(), SlotStatus::TemporarilyLocked);
    assert_eq!(slot.locked_by, Some(BOB));
    assert!(reaper::check_consistency(&pool).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn abandoned_payment_gives_way_to_the_new_lock_owner(pool: PgPool) {
    let state = common::build_test_state(pool.clone());
    let field = seed_field(&pool, 60).await;

    let slot_id = lock_at(&pool, field.id, at(4, 18, 0), ALICE, at(4, 10, 0)).await;
    let stale = draft(&pool, field.id, slot_id, ALICE, None, at(4, 10, 0))
        .await
        .unwrap();
    let initiated = payment::initiate_payment(
        &state,
        ALICE,
        &InitiatePayment {
            booking_id: stale.booking_id,
            amount_cents: stale.total_amount_cents,
            billing: BillingDetails::default(),
        },
        None,
        at(4, 10, 2),
    )
    .await
    .unwrap();
    assert_eq!(initiated.pay_by, at(4, 10, 32));

    // Before the deadline the pending payment still holds the slot.
    assert_matches!(
        lock_manager::lock_slot(&pool, field.id, SlotTarget::Persisted(slot_id), BOB, at(4, 10, 31)).await,
        Err(AppError::Reservation(ReservationError::SlotLockedByOther))
    );

    lock_manager::lock_slot(&pool, field.id, SlotTarget::Persisted(slot_id), BOB, at(4, 10, 33))
        .await
        .unwrap();
    draft(&pool, field.id, slot_id, BOB, None, at(4, 10, 33))
        .await
        .unwrap();

    let old = BookingRepo::find_by_id(&pool, stale.booking_id).await.unwrap().unwrap();
    assert_eq!(old.status(), BookingStatus::Failed);
    assert_eq!(old.payment_status(), PaymentStatus::Failed);

    let attempt = PaymentRepo::find_by_order_id(&pool, &initiated.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attempt.status(), PaymentStatus::Failed);
    assert!(reaper::check_consistency(&pool).await.unwrap().is_empty());
}
