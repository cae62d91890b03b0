//! Repository for the `slots` override table.
//!
//! Lock transitions are compare-and-swap updates: the `WHERE` clause pins
//! the status, owner and expiry the caller observed, so a concurrent writer
//! turns the update into a zero-row no-op instead of a lost update.

use fieldbook_core::slot_lock::LockObservation;
use fieldbook_core::status::{BookingStatus, SlotStatus, StatusId};
use fieldbook_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::slot::{NewSlot, Slot};

/// Column list for `slots` queries.
const COLUMNS: &str = "id, field_id, start_time, end_time, status_id, locked_by, \
    lock_expires_at, locked_at, price_cents, deposit_cents, created_at, updated_at";

/// Booking statuses that keep a lock alive (the booking still needs its slot).
fn holding_statuses() -> Vec<StatusId> {
    vec![BookingStatus::Draft.id(), BookingStatus::PendingPayment.id()]
}

/// Booking statuses that make a slot off-limits for release.
fn live_statuses() -> Vec<StatusId> {
    BookingStatus::LIVE.iter().map(|s| s.id()).collect()
}

/// Provides lookups, lock transitions and sweeps for slot rows.
pub struct SlotRepo;

impl SlotRepo {
    /// Find a slot by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Slot>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM slots WHERE id = $1");
        sqlx::query_as::<_, Slot>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a slot and lock its row for the rest of the transaction.
    pub async fn find_by_id_for_update_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: DbId,
    ) -> Result<Option<Slot>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM slots WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Slot>(&query)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Find the persisted row for a window by its natural key.
    pub async fn find_by_field_start(
        pool: &PgPool,
        field_id: DbId,
        start_time: Timestamp,
    ) -> Result<Option<Slot>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM slots WHERE field_id = $1 AND start_time = $2");
        sqlx::query_as::<_, Slot>(&query)
            .bind(field_id)
            .bind(start_time)
            .fetch_optional(pool)
            .await
    }

    /// List persisted rows of a field starting in `[from, to)`.
    pub async fn list_for_field_between(
        pool: &PgPool,
        field_id: DbId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<Slot>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM slots \
             WHERE field_id = $1 AND start_time >= $2 AND start_time < $3 \
             ORDER BY start_time"
        );
        sqlx::query_as::<_, Slot>(&query)
            .bind(field_id)
            .bind(from)
            .bind(to)
            .fetch_all(pool)
            .await
    }

    /// Materialize a virtual slot directly in the locked state.
    ///
    /// Returns `None` when a row for `(field_id, start_time)` already exists;
    /// the caller then re-reads and goes through [`Self::compare_and_lock`].
    pub async fn insert_locked(
        pool: &PgPool,
        input: &NewSlot,
        owner: DbId,
        expires_at: Timestamp,
        now: Timestamp,
    ) -> Result<Option<Slot>, sqlx::Error> {
        let query = format!(
            "INSERT INTO slots \
                (field_id, start_time, end_time, status_id, locked_by, lock_expires_at, \
                 locked_at, price_cents, deposit_cents) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT ON CONSTRAINT uq_slots_field_start DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Slot>(&query)
            .bind(input.field_id)
            .bind(input.start_time)
            .bind(input.end_time)
            .bind(SlotStatus::TemporarilyLocked.id())
            .bind(owner)
            .bind(expires_at)
            .bind(now)
            .bind(input.price_cents)
            .bind(input.deposit_cents)
            .fetch_optional(pool)
            .await
    }

    /// Lock a persisted slot if it still matches `expected`.
    ///
    /// Returns the updated row, or `None` if another writer changed the row
    /// since it was observed.
    pub async fn compare_and_lock(
        pool: &PgPool,
        slot_id: DbId,
        expected: &LockObservation,
        owner: DbId,
        expires_at: Timestamp,
        now: Timestamp,
    ) -> Result<Option<Slot>, sqlx::Error> {
        let query = format!(
            "UPDATE slots \
             SET status_id = $5, locked_by = $6, lock_expires_at = $7, locked_at = $8 \
             WHERE id = $1 \
               AND status_id = $2 \
               AND locked_by IS NOT DISTINCT FROM $3 \
               AND lock_expires_at IS NOT DISTINCT FROM $4 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Slot>(&query)
            .bind(slot_id)
            .bind(expected.status.id())
            .bind(expected.owner)
            .bind(expected.expires_at)
            .bind(SlotStatus::TemporarilyLocked.id())
            .bind(owner)
            .bind(expires_at)
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    /// Push an owner's still-live lock out to at least `until`. Never
    /// shortens it, and never revives a lock that lapsed at or before `now`.
    pub async fn extend_lock_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        slot_id: DbId,
        owner: DbId,
        until: Timestamp,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE slots SET lock_expires_at = GREATEST(lock_expires_at, $3) \
             WHERE id = $1 AND status_id = $4 AND locked_by = $2 AND lock_expires_at > $5",
        )
        .bind(slot_id)
        .bind(owner)
        .bind(until)
        .bind(SlotStatus::TemporarilyLocked.id())
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Turn an owner's lock into a booked slot, clearing the lock.
    pub async fn mark_booked_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        slot_id: DbId,
        owner: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE slots \
             SET status_id = $3, locked_by = NULL, lock_expires_at = NULL, locked_at = NULL \
             WHERE id = $1 AND status_id = $4 AND locked_by = $2",
        )
        .bind(slot_id)
        .bind(owner)
        .bind(SlotStatus::Booked.id())
        .bind(SlotStatus::TemporarilyLocked.id())
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Return an owner's lock to available.
    ///
    /// A no-op (returns `false`) if the slot is no longer locked by `owner`,
    /// e.g. because the lock expired and someone else took it.
    pub async fn release_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        slot_id: DbId,
        owner: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE slots \
             SET status_id = $3, locked_by = NULL, lock_expires_at = NULL, locked_at = NULL \
             WHERE id = $1 AND status_id = $4 AND locked_by = $2",
        )
        .bind(slot_id)
        .bind(owner)
        .bind(SlotStatus::Available.id())
        .bind(SlotStatus::TemporarilyLocked.id())
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Release a lock on behalf of its owner, provided no draft or
    /// pending-payment booking depends on it.
    pub async fn release_owned(
        pool: &PgPool,
        slot_id: DbId,
        owner: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE slots s \
             SET status_id = $3, locked_by = NULL, lock_expires_at = NULL, locked_at = NULL \
             WHERE s.id = $1 AND s.status_id = $4 AND s.locked_by = $2 \
               AND NOT EXISTS ( \
                   SELECT 1 FROM bookings b \
                   WHERE b.slot_id = s.id AND b.status_id = ANY($5))",
        )
        .bind(slot_id)
        .bind(owner)
        .bind(SlotStatus::Available.id())
        .bind(SlotStatus::TemporarilyLocked.id())
        .bind(holding_statuses())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Administrative release of a locked or unavailable slot.
    ///
    /// Refused (returns `false`) for booked slots and for slots with any
    /// live booking.
    pub async fn admin_release(pool: &PgPool, slot_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE slots s \
             SET status_id = $2, locked_by = NULL, lock_expires_at = NULL, locked_at = NULL \
             WHERE s.id = $1 AND s.status_id = ANY($3) \
               AND NOT EXISTS ( \
                   SELECT 1 FROM bookings b \
                   WHERE b.slot_id = s.id AND b.status_id = ANY($4))",
        )
        .bind(slot_id)
        .bind(SlotStatus::Available.id())
        .bind(vec![
            SlotStatus::TemporarilyLocked.id(),
            SlotStatus::Unavailable.id(),
        ])
        .bind(live_statuses())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a window unavailable, materializing its row if needed.
    ///
    /// Only available or expired-lock rows are changed. Returns the row when
    /// it ends up unavailable.
    pub async fn mark_unavailable(
        pool: &PgPool,
        input: &NewSlot,
        now: Timestamp,
    ) -> Result<Option<Slot>, sqlx::Error> {
        let query = format!(
            "INSERT INTO slots (field_id, start_time, end_time, status_id, price_cents, deposit_cents) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT ON CONSTRAINT uq_slots_field_start DO UPDATE \
             SET status_id = EXCLUDED.status_id, locked_by = NULL, \
                 lock_expires_at = NULL, locked_at = NULL \
             WHERE slots.status_id = $7 \
                OR (slots.status_id = $8 AND slots.lock_expires_at <= $9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Slot>(&query)
            .bind(input.field_id)
            .bind(input.start_time)
            .bind(input.end_time)
            .bind(SlotStatus::Unavailable.id())
            .bind(input.price_cents)
            .bind(input.deposit_cents)
            .bind(SlotStatus::Available.id())
            .bind(SlotStatus::TemporarilyLocked.id())
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Sweeps
    // -----------------------------------------------------------------------

    /// Bulk-release locks that expired at or before `now`, optionally
    /// limited to one field.
    ///
    /// Slots still backing a draft or pending-payment booking are skipped;
    /// those are reclaimed together with their booking.
    pub async fn release_expired_locks(
        pool: &PgPool,
        field_id: Option<DbId>,
        now: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE slots s \
             SET status_id = $3, locked_by = NULL, lock_expires_at = NULL, locked_at = NULL \
             WHERE s.status_id = $4 AND s.lock_expires_at <= $1 \
               AND ($2::BIGINT IS NULL OR s.field_id = $2) \
               AND NOT EXISTS ( \
                   SELECT 1 FROM bookings b \
                   WHERE b.slot_id = s.id AND b.status_id = ANY($5))",
        )
        .bind(now)
        .bind(field_id)
        .bind(SlotStatus::Available.id())
        .bind(SlotStatus::TemporarilyLocked.id())
        .bind(holding_statuses())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Release live locks that were taken or refreshed at or before
    /// `stale_before` and have no draft or pending-payment booking behind
    /// them.
    pub async fn release_orphaned_locks(
        pool: &PgPool,
        stale_before: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE slots s \
             SET status_id = $2, locked_by = NULL, lock_expires_at = NULL, locked_at = NULL \
             WHERE s.status_id = $3 AND s.locked_at <= $1 \
               AND NOT EXISTS ( \
                   SELECT 1 FROM bookings b \
                   WHERE b.slot_id = s.id AND b.status_id = ANY($4))",
        )
        .bind(stale_before)
        .bind(SlotStatus::Available.id())
        .bind(SlotStatus::TemporarilyLocked.id())
        .bind(holding_statuses())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
