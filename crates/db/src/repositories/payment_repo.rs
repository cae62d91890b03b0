//! Repository for the `payments` table.

use fieldbook_core::status::PaymentStatus;
use fieldbook_core::types::DbId;
use sqlx::PgPool;

use crate::models::payment::{NewPayment, Payment};

/// Column list for `payments` queries.
const COLUMNS: &str = "id, booking_id, amount_cents, currency, order_id, transaction_id, \
    status_id, payment_url, provider_metadata, created_at, updated_at";

/// Provides payment attempt persistence.
pub struct PaymentRepo;

impl PaymentRepo {
    /// Record a payment attempt in processing state.
    ///
    /// `uq_payments_order_id` rejects a reused order identifier.
    pub async fn create_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        input: &NewPayment,
    ) -> Result<Payment, sqlx::Error> {
        let query = format!(
            "INSERT INTO payments \
                (booking_id, amount_cents, currency, order_id, status_id, payment_url, provider_metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Payment>(&query)
            .bind(input.booking_id)
            .bind(input.amount_cents)
            .bind(&input.currency)
            .bind(&input.order_id)
            .bind(PaymentStatus::Processing.id())
            .bind(input.payment_url.as_deref())
            .bind(&input.provider_metadata)
            .fetch_one(&mut **tx)
            .await
    }

    /// Find a payment by the external order identifier.
    pub async fn find_by_order_id(
        pool: &PgPool,
        order_id: &str,
    ) -> Result<Option<Payment>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM payments WHERE order_id = $1");
        sqlx::query_as::<_, Payment>(&query)
            .bind(order_id)
            .fetch_optional(pool)
            .await
    }

    /// Find a payment by order identifier and lock its row.
    pub async fn find_by_order_id_for_update_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        order_id: &str,
    ) -> Result<Option<Payment>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM payments WHERE order_id = $1 FOR UPDATE");
        sqlx::query_as::<_, Payment>(&query)
            .bind(order_id)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Find the payment that already consumed a provider transaction id.
    pub async fn find_by_transaction_id_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        transaction_id: &str,
    ) -> Result<Option<Payment>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM payments WHERE transaction_id = $1");
        sqlx::query_as::<_, Payment>(&query)
            .bind(transaction_id)
            .fetch_optional(&mut **tx)
            .await
    }

    /// All payment attempts of a booking, newest first.
    pub async fn list_for_booking(
        pool: &PgPool,
        booking_id: DbId,
    ) -> Result<Vec<Payment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM payments WHERE booking_id = $1 ORDER BY id DESC"
        );
        sqlx::query_as::<_, Payment>(&query)
            .bind(booking_id)
            .fetch_all(pool)
            .await
    }

    /// Whether any attempt for the booking already reached paid.
    pub async fn has_paid_for_booking(
        pool: &PgPool,
        booking_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM payments WHERE booking_id = $1 AND status_id = $2)",
        )
        .bind(booking_id)
        .bind(PaymentStatus::Paid.id())
        .fetch_one(pool)
        .await
    }

    /// Settle a processing payment exactly once.
    ///
    /// Returns `false` if the payment was already settled.
    pub async fn settle_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: DbId,
        status: PaymentStatus,
        transaction_id: Option<&str>,
        provider_metadata: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE payments \
             SET status_id = $2, transaction_id = COALESCE($3, transaction_id), \
                 provider_metadata = provider_metadata || $4 \
             WHERE id = $1 AND status_id = $5",
        )
        .bind(id)
        .bind(status.id())
        .bind(transaction_id)
        .bind(provider_metadata)
        .bind(PaymentStatus::Processing.id())
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fail every still-processing attempt of a booking.
    pub async fn fail_processing_for_booking_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        booking_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE payments SET status_id = $2 WHERE booking_id = $1 AND status_id = $3",
        )
        .bind(booking_id)
        .bind(PaymentStatus::Failed.id())
        .bind(PaymentStatus::Processing.id())
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }
}
