//! Repository for the `fields` table.

use fieldbook_core::status::FieldStatus;
use fieldbook_core::types::DbId;
use sqlx::PgPool;

use crate::models::field::{CreateField, Field};

/// Column list for `fields` queries.
const COLUMNS: &str = "id, name, opening_time, closing_time, slot_duration_minutes, \
    hourly_price_cents, deposit_price_cents, timezone, status_id, created_at, updated_at";

/// Provides read access to fields plus creation for seeding.
pub struct FieldRepo;

impl FieldRepo {
    /// Insert a new field, returning the created row.
    ///
    /// If `status_id` is `None`, defaults to open.
    pub async fn create(pool: &PgPool, input: &CreateField) -> Result<Field, sqlx::Error> {
        let query = format!(
            "INSERT INTO fields \
                (name, opening_time, closing_time, slot_duration_minutes, \
                 hourly_price_cents, deposit_price_cents, timezone, status_id) \
             VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, 'UTC'), COALESCE($8, $9)) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Field>(&query)
            .bind(&input.name)
            .bind(input.opening_time)
            .bind(input.closing_time)
            .bind(input.slot_duration_minutes)
            .bind(input.hourly_price_cents)
            .bind(input.deposit_price_cents)
            .bind(input.timezone.as_deref())
            .bind(input.status_id)
            .bind(FieldStatus::Open.id())
            .fetch_one(pool)
            .await
    }

    /// Find a field by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Field>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM fields WHERE id = $1");
        sqlx::query_as::<_, Field>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Change a field's operational status. Returns `true` if the row exists.
    pub async fn set_status(
        pool: &PgPool,
        id: DbId,
        status: FieldStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE fields SET status_id = $2 WHERE id = $1")
            .bind(id)
            .bind(status.id())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
