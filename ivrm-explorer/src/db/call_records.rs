//! Call attempt record persistence

use chrono::{DateTime, Utc};
use ivrm_common::time::{db_now, parse_db_timestamp, to_db_timestamp};
use ivrm_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};

use crate::models::{CallAttemptRecord, DialPayload};

const RECORD_COLUMNS: &str =
    "id, target_id, recording_id, payload, transcript, duration_secs, created_at";

fn row_to_record(row: &SqliteRow) -> Result<CallAttemptRecord> {
    let payload: String = row.get("payload");
    let created_at: String = row.get("created_at");

    Ok(CallAttemptRecord {
        id: row.get("id"),
        target_id: row.get("target_id"),
        recording_id: row.get("recording_id"),
        payload: DialPayload::from_canonical_json(&payload)?,
        transcript: row.get("transcript"),
        duration_secs: row.get("duration_secs"),
        created_at: parse_db_timestamp(&created_at)?,
    })
}

pub async fn insert_record<'e, E>(
    executor: E,
    target_id: i64,
    recording_id: &str,
    payload: &DialPayload,
    duration_secs: Option<f64>,
) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO call_records (target_id, recording_id, payload, duration_secs, created_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(target_id)
    .bind(recording_id)
    .bind(payload.to_canonical_json()?)
    .bind(duration_secs)
    .bind(db_now())
    .fetch_one(executor)
    .await?;

    Ok(id)
}

pub async fn get_record(pool: &SqlitePool, id: i64) -> Result<Option<CallAttemptRecord>> {
    let row = sqlx::query(&format!("SELECT {} FROM call_records WHERE id = ?", RECORD_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_record).transpose()
}

pub async fn list_for_target(pool: &SqlitePool, target_id: i64) -> Result<Vec<CallAttemptRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM call_records WHERE target_id = ? ORDER BY created_at, id",
        RECORD_COLUMNS
    ))
    .bind(target_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_record).collect()
}

/// Oldest records still waiting for a transcript
pub async fn list_untranscribed(pool: &SqlitePool, limit: i64) -> Result<Vec<CallAttemptRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM call_records WHERE transcript IS NULL ORDER BY created_at, id LIMIT ?",
        RECORD_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_record).collect()
}

/// Store a transcript unless another worker already did
///
/// Returns whether this call wrote it.
pub async fn set_transcript_if_empty(pool: &SqlitePool, id: i64, transcript: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE call_records SET transcript = ?, transcribed_at = ?
        WHERE id = ? AND (transcript IS NULL OR transcript = '')
        "#,
    )
    .bind(transcript)
    .bind(db_now())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Records created before `cutoff` whose transcript is missing or shorter
/// than `min_len` characters
pub async fn list_stalled(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
    min_len: i64,
) -> Result<Vec<CallAttemptRecord>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {} FROM call_records
        WHERE created_at < ?
          AND (transcript IS NULL OR length(trim(transcript)) < ?)
        ORDER BY created_at, id
        "#,
        RECORD_COLUMNS
    ))
    .bind(to_db_timestamp(cutoff))
    .bind(min_len)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_record).collect()
}

pub async fn delete_record<'e, E>(executor: E, id: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM call_records WHERE id = ?")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Non-empty transcripts of a target, oldest first
pub async fn transcripts_for_target(pool: &SqlitePool, target_id: i64) -> Result<Vec<String>> {
    let transcripts: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT transcript FROM call_records
        WHERE target_id = ? AND transcript IS NOT NULL AND transcript != ''
        ORDER BY created_at, id
        "#,
    )
    .bind(target_id)
    .fetch_all(pool)
    .await?;
    Ok(transcripts)
}

pub async fn count_untranscribed_for_target(pool: &SqlitePool, target_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM call_records WHERE target_id = ? AND transcript IS NULL",
    )
    .bind(target_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

pub async fn count_transcribed_for_target(pool: &SqlitePool, target_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM call_records WHERE target_id = ? AND transcript IS NOT NULL AND transcript != ''",
    )
    .bind(target_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Whether any transcript of the target was stored after `since`
///
/// With no `since` this is "has any transcript at all".
pub async fn has_transcripts_since(
    pool: &SqlitePool,
    target_id: i64,
    since: Option<DateTime<Utc>>,
) -> Result<bool> {
    let since = since.map(to_db_timestamp).unwrap_or_default();
    let exists: i64 = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM call_records
            WHERE target_id = ? AND transcript IS NOT NULL AND transcript != ''
              AND transcribed_at > ?
        )
        "#,
    )
    .bind(target_id)
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(exists == 1)
}

pub async fn count_for_target(pool: &SqlitePool, target_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM call_records WHERE target_id = ?")
        .bind(target_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}
