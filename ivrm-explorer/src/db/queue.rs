//! Queue item persistence
//!
//! Raw statements only; the claim/complete/fail protocol lives in
//! `services::queue_manager`.

use chrono::{DateTime, Utc};
use ivrm_common::time::{db_now, parse_db_timestamp, to_db_timestamp};
use ivrm_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};

use crate::models::{DialPayload, QueueItem};

pub(crate) const ITEM_COLUMNS: &str =
    "id, target_id, payload, status, attempts, last_error, created_at, updated_at";

pub(crate) fn row_to_item(row: &SqliteRow) -> Result<QueueItem> {
    let payload: String = row.get("payload");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(QueueItem {
        id: row.get("id"),
        target_id: row.get("target_id"),
        payload: DialPayload::from_canonical_json(&payload)?,
        status: status.parse()?,
        attempts: row.get("attempts"),
        last_error: row.get("last_error"),
        created_at: parse_db_timestamp(&created_at)?,
        updated_at: parse_db_timestamp(&updated_at)?,
    })
}

/// Insert a pending item unless `(target_id, payload)` is already live
///
/// Returns whether a row was inserted.
pub async fn insert_if_absent<'e, E>(
    executor: E,
    target_id: i64,
    payload: &DialPayload,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let now = db_now();
    let result = sqlx::query(
        r#"
        INSERT INTO queue_items (target_id, payload, status, attempts, created_at, updated_at)
        VALUES (?, ?, 'pending', 0, ?, ?)
        ON CONFLICT(target_id, payload) DO NOTHING
        "#,
    )
    .bind(target_id)
    .bind(payload.to_canonical_json()?)
    .bind(&now)
    .bind(&now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Flip the oldest pending item to `processing` and return it
///
/// Must run inside a write-reserving transaction so the select and update
/// see the same snapshot.
pub async fn claim_oldest_pending<'e, E>(executor: E) -> Result<Option<QueueItem>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!(
        r#"
        UPDATE queue_items
        SET status = 'processing', attempts = attempts + 1, updated_at = ?
        WHERE id = (
            SELECT id FROM queue_items
            WHERE status = 'pending'
            ORDER BY created_at, id
            LIMIT 1
        )
        RETURNING {}
        "#,
        ITEM_COLUMNS
    ))
    .bind(db_now())
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(row_to_item).transpose()
}

pub async fn delete_item<'e, E>(executor: E, id: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM queue_items WHERE id = ?")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn get_item(pool: &SqlitePool, id: i64) -> Result<Option<QueueItem>> {
    let row = sqlx::query(&format!("SELECT {} FROM queue_items WHERE id = ?", ITEM_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_item).transpose()
}

pub async fn list_for_target(pool: &SqlitePool, target_id: i64) -> Result<Vec<QueueItem>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM queue_items WHERE target_id = ? ORDER BY created_at, id",
        ITEM_COLUMNS
    ))
    .bind(target_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_item).collect()
}

/// Items stuck in `processing` since before `cutoff`
pub async fn list_processing_before<'e, E>(
    executor: E,
    cutoff: DateTime<Utc>,
) -> Result<Vec<QueueItem>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(&format!(
        "SELECT {} FROM queue_items WHERE status = 'processing' AND updated_at < ? ORDER BY id",
        ITEM_COLUMNS
    ))
    .bind(to_db_timestamp(cutoff))
    .fetch_all(executor)
    .await?;
    rows.iter().map(row_to_item).collect()
}

/// Put a `processing` item back to `pending`, keeping its attempt count
pub async fn release_to_pending<'e, E>(executor: E, id: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE queue_items SET status = 'pending', updated_at = ? WHERE id = ? AND status = 'processing'",
    )
    .bind(db_now())
    .bind(id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn count_pending(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_items WHERE status = 'pending'")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn count_processing(pool: &SqlitePool) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM queue_items WHERE status = 'processing'")
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// Pending or processing items of one target
pub async fn count_live_for_target(pool: &SqlitePool, target_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM queue_items WHERE target_id = ? AND status IN ('pending', 'processing')",
    )
    .bind(target_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}
