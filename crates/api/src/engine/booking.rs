//! Booking creation, reads and cancellation.

use fieldbook_core::booking_limits::{check_booking_limits, day_bounds, week_bounds};
use fieldbook_core::booking_state::{draft_expiry, lapsed_outcome, require_status};
use fieldbook_core::error::ReservationError;
use fieldbook_core::idempotency::OP_CREATE_BOOKING;
use fieldbook_core::slot_lock::verify_held_by;
use fieldbook_core::slot_schedule::needs_confirmation;
use fieldbook_core::status::{BookingStatus, PaymentStatus};
use fieldbook_core::types::{AmountCents, DbId, Timestamp};
use fieldbook_db::models::booking::{Booking, NewBooking};
use fieldbook_db::models::payment::Payment;
use fieldbook_db::repositories::{BookingRepo, PaymentRepo, SlotRepo};
use fieldbook_events::bus::event_types;
use fieldbook_events::{EventBus, PlatformEvent};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use super::idempotency::{self, Begin};
use super::reaper::settle_lapsed_tx;
use super::{load_field, settle_booking_tx};
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::middleware::auth::AuthUser;

/// The request fields covered by the idempotency hash.
#[derive(Debug, Clone, Serialize)]
pub struct CreateBooking {
    pub slot_id: DbId,
    pub field_id: DbId,
}

/// Response of a booking creation; stored verbatim for replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingCreated {
    pub booking_id: DbId,
    pub status: BookingStatus,
    pub total_amount_cents: AmountCents,
    pub expires_at: Timestamp,
    /// Advisory: the slot starts within 24 hours.
    pub needs_confirmation: bool,
}

/// A booking together with its payment attempts.
#[derive(Debug, Serialize)]
pub struct BookingDetail {
    #[serde(flatten)]
    pub booking: Booking,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payments: Vec<Payment>,
}

/// Create a draft booking on a slot the caller holds a live lock on.
pub async fn create_booking(
    pool: &PgPool,
    events: &EventBus,
    user_id: DbId,
    input: &CreateBooking,
    idempotency_key: Option<&str>,
    now: Timestamp,
) -> AppResult<BookingCreated> {
    let claim = match idempotency_key {
        Some(key) => match idempotency::begin(pool, key, user_id, OP_CREATE_BOOKING, input, now).await? {
            Begin::Replay(response) => return idempotency::decode_replay(response),
            Begin::Proceed(claim) => Some(claim),
        },
        None => None,
    };

    let result = create_draft(pool, user_id, input, idempotency_key, now)
        .await
        .map(|(created, lapsed)| {
            if let Some(lapsed) = lapsed {
                publish_lapsed(events, &lapsed);
            }
            created
        });
    idempotency::finish(pool, claim, &result, now).await;

    if let Ok(created) = &result {
        events.publish(
            PlatformEvent::new(event_types::BOOKING_CREATED)
                .for_booking(created.booking_id)
                .notify(user_id)
                .with_payload(serde_json::json!({
                    "slot_id": input.slot_id,
                    "field_id": input.field_id,
                    "expires_at": created.expires_at,
                    "needs_confirmation": created.needs_confirmation,
                })),
        );
    }

    result
}

/// A previous holder's booking that lapsed unswept and was settled to make
/// room for a new draft.
struct LapsedBooking {
    booking_id: DbId,
    user_id: DbId,
    status: BookingStatus,
}

fn publish_lapsed(events: &EventBus, lapsed: &LapsedBooking) {
    let event = match lapsed.status {
        BookingStatus::Expired => PlatformEvent::new(event_types::BOOKING_EXPIRED),
        _ => PlatformEvent::new(event_types::BOOKING_FAILED)
            .with_payload(serde_json::json!({ "reason": "payment_timeout" })),
    };
    events.publish(event.for_booking(lapsed.booking_id).notify(lapsed.user_id));
}

async fn create_draft(
    pool: &PgPool,
    user_id: DbId,
    input: &CreateBooking,
    idempotency_key: Option<&str>,
    now: Timestamp,
) -> AppResult<(BookingCreated, Option<LapsedBooking>)> {
    let field = load_field(pool, input.field_id).await?;
    let schedule = field.schedule()?;

    let mut tx = pool.begin().await?;

    let slot = SlotRepo::find_by_id_for_update_tx(&mut tx, input.slot_id)
        .await?
        .filter(|slot| slot.field_id == input.field_id)
        .ok_or(ReservationError::SlotNotFound)?;

    if slot.start_time <= now {
        return Err(ReservationError::SlotAlreadyStarted.into());
    }
    verify_held_by(&slot.observation(), user_id, now)?;

    // The caller holds a live lock, so a booking still counted as live here
    // can only be one whose deadline passed before the sweep reached it.
    let lapsed = match BookingRepo::find_live_for_slot_tx(&mut tx, slot.id).await? {
        None => None,
        Some(live) => {
            let Some(to) = lapsed_outcome(live.status(), live.expires_at, now) else {
                return Err(ReservationError::SlotAlreadyBooked.into());
            };
            settle_lapsed_tx(&mut tx, live.id, live.status(), to, now).await?;
            tracing::info!(
                booking_id = live.id,
                slot_id = slot.id,
                %to,
                "Lapsed booking settled on lock handover"
            );
            Some(LapsedBooking {
                booking_id: live.id,
                user_id: live.user_id,
                status: to,
            })
        }
    };

    // Soft quota: read outside the slot row lock, may race with the same
    // player's concurrent bookings on other slots.
    let date = schedule.local_date(slot.start_time);
    let usage = BookingRepo::limit_usage(
        pool,
        user_id,
        day_bounds(date, schedule.timezone),
        week_bounds(date, schedule.timezone),
    )
    .await?;
    check_booking_limits(&usage, slot.duration_minutes())?;

    let expires_at = draft_expiry(now);
    let booking = BookingRepo::create_draft_tx(
        &mut tx,
        &NewBooking {
            user_id,
            field_id: input.field_id,
            slot_id: slot.id,
            total_amount_cents: slot.price_cents,
            expires_at,
            idempotency_key: idempotency_key.map(str::to_string),
        },
    )
    .await
    .map_err(|e| {
        if is_unique_violation(&e, "uq_bookings_active_slot") {
            ReservationError::SlotAlreadyBooked.into()
        } else {
            AppError::from(e)
        }
    })?;

    // A draft is always backed by a lock that outlives it.
    if !SlotRepo::extend_lock_tx(&mut tx, slot.id, user_id, expires_at, now).await? {
        return Err(ReservationError::SlotLockExpired.into());
    }

    tx.commit().await?;

    tracing::info!(
        booking_id = booking.id,
        slot_id = slot.id,
        user_id,
        amount_cents = booking.total_amount_cents,
        "Draft booking created"
    );

    let created = BookingCreated {
        booking_id: booking.id,
        status: booking.status(),
        total_amount_cents: booking.total_amount_cents,
        expires_at: booking.expires_at,
        needs_confirmation: needs_confirmation(slot.start_time, now),
    };
    Ok((created, lapsed))
}

/// Read a booking. Players see their own; admins see any.
pub async fn get_booking(pool: &PgPool, booking_id: DbId, caller: &AuthUser) -> AppResult<BookingDetail> {
    let booking = BookingRepo::find_by_id(pool, booking_id)
        .await?
        .ok_or(ReservationError::BookingNotFound(booking_id))?;

    if booking.user_id != caller.user_id && !caller.is_admin() {
        return Err(ReservationError::BookingNotOwned.into());
    }

    let payments = PaymentRepo::list_for_booking(pool, booking_id).await?;
    Ok(BookingDetail {
        status: booking.status(),
        payment_status: booking.payment_status(),
        booking,
        payments,
    })
}

/// Cancel a draft: booking cancelled, payment refunded, slot available.
pub async fn cancel_booking(
    pool: &PgPool,
    events: &EventBus,
    booking_id: DbId,
    user_id: DbId,
    now: Timestamp,
) -> AppResult<Booking> {
    let mut tx = pool.begin().await?;

    let booking = BookingRepo::find_by_id_for_update_tx(&mut tx, booking_id)
        .await?
        .ok_or(ReservationError::BookingNotFound(booking_id))?;
    if booking.user_id != user_id {
        return Err(ReservationError::BookingNotOwned.into());
    }
    require_status(booking.status(), BookingStatus::Draft)?;

    settle_booking_tx(
        &mut tx,
        booking.id,
        BookingStatus::Draft,
        BookingStatus::Cancelled,
        PaymentStatus::Refunded,
        now,
    )
    .await?;

    if !SlotRepo::release_tx(&mut tx, booking.slot_id, user_id).await? {
        tracing::warn!(booking_id, slot_id = booking.slot_id, "Cancelled booking's slot was not locked by its owner");
    }

    tx.commit().await?;

    tracing::info!(booking_id, user_id, slot_id = booking.slot_id, "Booking cancelled");
    events.publish(
        PlatformEvent::new(event_types::BOOKING_CANCELLED)
            .for_booking(booking_id)
            .notify(user_id),
    );

    let cancelled = BookingRepo::find_by_id(pool, booking_id)
        .await?
        .ok_or(ReservationError::BookingNotFound(booking_id))?;
    Ok(cancelled)
}
