//! Repository for the `bookings` table.

use fieldbook_core::booking_limits::{LimitUsage, Period};
use fieldbook_core::status::{BookingStatus, PaymentStatus, StatusId};
use fieldbook_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::booking::{Booking, JointStateRow, NewBooking, ReapedBooking};

/// Column list for `bookings` queries.
const COLUMNS: &str = "id, user_id, field_id, slot_id, status_id, payment_status_id, \
    total_amount_cents, expires_at, idempotency_key, order_id, payment_initiated_at, \
    settled_at, created_at, updated_at";

fn status_ids(statuses: &[BookingStatus]) -> Vec<StatusId> {
    statuses.iter().map(|s| s.id()).collect()
}

/// Provides booking persistence, transitions and sweep queries.
pub struct BookingRepo;

impl BookingRepo {
    /// Find a booking by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Booking>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM bookings WHERE id = $1");
        sqlx::query_as::<_, Booking>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a booking and lock its row for the rest of the transaction.
    pub async fn find_by_id_for_update_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: DbId,
    ) -> Result<Option<Booking>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Booking>(&query)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Find the live (draft, pending-payment or confirmed) booking of a slot.
    pub async fn find_live_for_slot_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        slot_id: DbId,
    ) -> Result<Option<Booking>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM bookings WHERE slot_id = $1 AND status_id = ANY($2)"
        );
        sqlx::query_as::<_, Booking>(&query)
            .bind(slot_id)
            .bind(status_ids(&BookingStatus::LIVE))
            .fetch_optional(&mut **tx)
            .await
    }

    /// Insert a draft booking with payment status pending.
    ///
    /// The partial unique index `uq_bookings_active_slot` rejects a second
    /// live booking for the same slot.
    pub async fn create_draft_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        input: &NewBooking,
    ) -> Result<Booking, sqlx::Error> {
        let query = format!(
            "INSERT INTO bookings \
                (user_id, field_id, slot_id, status_id, payment_status_id, \
                 total_amount_cents, expires_at, idempotency_key) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Booking>(&query)
            .bind(input.user_id)
            .bind(input.field_id)
            .bind(input.slot_id)
            .bind(BookingStatus::Draft.id())
            .bind(PaymentStatus::Pending.id())
            .bind(input.total_amount_cents)
            .bind(input.expires_at)
            .bind(input.idempotency_key.as_deref())
            .fetch_one(&mut **tx)
            .await
    }

    /// Minutes of counted bookings (confirmed or pending payment) the user
    /// holds on slots starting within `day` and within `week`.
    pub async fn limit_usage(
        pool: &PgPool,
        user_id: DbId,
        day: Period,
        week: Period,
    ) -> Result<LimitUsage, sqlx::Error> {
        let (day_minutes, week_minutes): (i64, i64) = sqlx::query_as(
            "SELECT \
                COALESCE(SUM(d.minutes) FILTER (WHERE d.start_time >= $2 AND d.start_time < $3), 0)::BIGINT, \
                COALESCE(SUM(d.minutes), 0)::BIGINT \
             FROM ( \
                SELECT s.start_time, \
                       (EXTRACT(EPOCH FROM (s.end_time - s.start_time)) / 60)::BIGINT AS minutes \
                FROM bookings b \
                JOIN slots s ON s.id = b.slot_id \
                WHERE b.user_id = $1 AND b.status_id = ANY($6) \
                  AND s.start_time >= $4 AND s.start_time < $5 \
             ) d",
        )
        .bind(user_id)
        .bind(day.start)
        .bind(day.end)
        .bind(week.start)
        .bind(week.end)
        .bind(status_ids(&BookingStatus::COUNTED_FOR_LIMITS))
        .fetch_one(pool)
        .await?;
        Ok(LimitUsage {
            day_minutes,
            week_minutes,
        })
    }

    /// Move an unexpired draft to pending payment, recording the order and
    /// pushing the expiry out to the payment deadline.
    pub async fn mark_pending_payment_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: DbId,
        order_id: &str,
        payment_deadline: Timestamp,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE bookings \
             SET status_id = $2, payment_status_id = $3, order_id = $4, \
                 payment_initiated_at = $5, expires_at = $6 \
             WHERE id = $1 AND status_id = $7 AND expires_at > $5",
        )
        .bind(id)
        .bind(BookingStatus::PendingPayment.id())
        .bind(PaymentStatus::Processing.id())
        .bind(order_id)
        .bind(now)
        .bind(payment_deadline)
        .bind(BookingStatus::Draft.id())
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Apply a terminal transition if the booking is still in `from`.
    pub async fn settle_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: DbId,
        from: BookingStatus,
        to: BookingStatus,
        payment_status: PaymentStatus,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE bookings \
             SET status_id = $3, payment_status_id = $4, settled_at = $5 \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(id)
        .bind(from.id())
        .bind(to.id())
        .bind(payment_status.id())
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // Sweeps
    // -----------------------------------------------------------------------

    /// Drafts whose expiry passed at or before `now`, oldest first.
    pub async fn find_expired_drafts(
        pool: &PgPool,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<ReapedBooking>, sqlx::Error> {
        sqlx::query_as::<_, ReapedBooking>(
            "SELECT id, user_id, slot_id FROM bookings \
             WHERE status_id = $1 AND expires_at <= $2 \
             ORDER BY expires_at \
             LIMIT $3",
        )
        .bind(BookingStatus::Draft.id())
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Pending-payment bookings whose payment was initiated at or before
    /// `initiated_before`.
    pub async fn find_abandoned_payments(
        pool: &PgPool,
        initiated_before: Timestamp,
        limit: i64,
    ) -> Result<Vec<ReapedBooking>, sqlx::Error> {
        sqlx::query_as::<_, ReapedBooking>(
            "SELECT id, user_id, slot_id FROM bookings \
             WHERE status_id = $1 AND payment_initiated_at <= $2 \
             ORDER BY payment_initiated_at \
             LIMIT $3",
        )
        .bind(BookingStatus::PendingPayment.id())
        .bind(initiated_before)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Hard-delete bookings that expired at or before `cutoff`.
    pub async fn purge_expired(pool: &PgPool, cutoff: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM bookings WHERE status_id = $1 AND settled_at <= $2")
            .bind(BookingStatus::Expired.id())
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    // -----------------------------------------------------------------------
    // Consistency
    // -----------------------------------------------------------------------

    /// The latest booking of every slot joined with the slot status.
    pub async fn list_joint_states(pool: &PgPool) -> Result<Vec<JointStateRow>, sqlx::Error> {
        sqlx::query_as::<_, JointStateRow>(
            "SELECT l.id AS booking_id, l.slot_id, l.user_id, \
                    s.status_id AS slot_status_id, l.status_id AS booking_status_id, \
                    l.payment_status_id, l.settled_at, s.locked_at \
             FROM ( \
                SELECT DISTINCT ON (slot_id) \
                       id, slot_id, user_id, status_id, payment_status_id, settled_at \
                FROM bookings \
                ORDER BY slot_id, id DESC \
             ) l \
             JOIN slots s ON s.id = l.slot_id \
             ORDER BY l.id",
        )
        .fetch_all(pool)
        .await
    }

    /// Latest-booking rows whose (slot, booking, payment) triple is not
    /// allowed at rest.
    pub async fn find_joint_violations(pool: &PgPool) -> Result<Vec<JointStateRow>, sqlx::Error> {
        let rows = Self::list_joint_states(pool).await?;
        Ok(rows.into_iter().filter(|row| !row.is_consistent()).collect())
    }
}
