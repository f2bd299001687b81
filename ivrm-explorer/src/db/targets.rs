//! Target persistence

use chrono::{DateTime, Utc};
use ivrm_common::time::{db_now, parse_db_timestamp, to_db_timestamp};
use ivrm_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};

use crate::models::{DigitMap, Target, TargetStatus};

const TARGET_COLUMNS: &str = "id, dial_string, status, summary, summary_updated_at, digit_map, \
                              last_error, idle_cycles, created_at, updated_at";

fn row_to_target(row: &SqliteRow) -> Result<Target> {
    let status: String = row.get("status");
    let summary_updated_at: Option<String> = row.get("summary_updated_at");
    let digit_map: Option<String> = row.get("digit_map");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Target {
        id: row.get("id"),
        dial_string: row.get("dial_string"),
        status: status.parse()?,
        summary: row.get("summary"),
        summary_updated_at: summary_updated_at
            .map(|s| parse_db_timestamp(&s))
            .transpose()?,
        digit_map: digit_map
            .map(|s| serde_json::from_str::<DigitMap>(&s))
            .transpose()
            .map_err(|e| Error::Internal(format!("Failed to deserialize digit_map: {}", e)))?,
        last_error: row.get("last_error"),
        idle_cycles: row.get("idle_cycles"),
        created_at: parse_db_timestamp(&created_at)?,
        updated_at: parse_db_timestamp(&updated_at)?,
    })
}

/// Insert a target if the dial string is unknown
///
/// Returns the stored target and whether this call created it.
pub async fn get_or_create_target(pool: &SqlitePool, dial_string: &str) -> Result<(Target, bool)> {
    let now = db_now();
    let inserted = sqlx::query(
        r#"
        INSERT INTO targets (dial_string, status, created_at, updated_at)
        VALUES (?, 'new', ?, ?)
        ON CONFLICT(dial_string) DO NOTHING
        "#,
    )
    .bind(dial_string)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?
    .rows_affected()
        == 1;

    let target = get_target_by_dial_string(pool, dial_string)
        .await?
        .ok_or_else(|| Error::Internal(format!("target {} vanished after insert", dial_string)))?;

    Ok((target, inserted))
}

pub async fn get_target<'e, E>(executor: E, id: i64) -> Result<Option<Target>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!("SELECT {} FROM targets WHERE id = ?", TARGET_COLUMNS))
        .bind(id)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(row_to_target).transpose()
}

pub async fn get_target_by_dial_string(
    pool: &SqlitePool,
    dial_string: &str,
) -> Result<Option<Target>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM targets WHERE dial_string = ?",
        TARGET_COLUMNS
    ))
    .bind(dial_string)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_target).transpose()
}

pub async fn list_targets_by_status(
    pool: &SqlitePool,
    status: TargetStatus,
) -> Result<Vec<Target>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM targets WHERE status = ? ORDER BY id",
        TARGET_COLUMNS
    ))
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_target).collect()
}

pub async fn count_by_status(pool: &SqlitePool, status: TargetStatus) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM targets WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Guarded forward transition
///
/// Returns `false` when the target is no longer in `from` (another worker
/// moved it first). Rejects transitions the status machine does not allow.
pub async fn transition_status<'e, E>(
    executor: E,
    id: i64,
    from: TargetStatus,
    to: TargetStatus,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    if !from.can_transition_to(to) {
        return Err(Error::InvalidInput(format!(
            "target {}: transition {} -> {} not allowed",
            id, from, to
        )));
    }

    let result = sqlx::query(
        "UPDATE targets SET status = ?, idle_cycles = 0, updated_at = ? WHERE id = ? AND status = ?",
    )
    .bind(to.as_str())
    .bind(db_now())
    .bind(id)
    .bind(from.as_str())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Reset a target to `new` from any status
pub async fn recall_target(pool: &SqlitePool, id: i64) -> Result<Target> {
    let result = sqlx::query(
        "UPDATE targets SET status = 'new', idle_cycles = 0, updated_at = ? WHERE id = ?",
    )
    .bind(db_now())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("target {}", id)));
    }

    get_target(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("target {}", id)))
}

pub async fn record_dial_error<'e, E>(executor: E, id: i64, error: &str) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE targets SET last_error = ?, updated_at = ? WHERE id = ?")
        .bind(error)
        .bind(db_now())
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn set_summary(
    pool: &SqlitePool,
    id: i64,
    summary: &str,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE targets SET summary = ?, summary_updated_at = ?, updated_at = ? WHERE id = ?")
        .bind(summary)
        .bind(to_db_timestamp(updated_at))
        .bind(db_now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_digit_map<'e, E>(executor: E, id: i64, digit_map: &DigitMap) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let json = serde_json::to_string(digit_map)?;
    sqlx::query("UPDATE targets SET digit_map = ?, updated_at = ? WHERE id = ?")
        .bind(json)
        .bind(db_now())
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Targets that were never given a digit map but have something to build
/// one from (a summary or a transcribed call)
pub async fn targets_without_digit_map(pool: &SqlitePool) -> Result<Vec<Target>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {} FROM targets t
        WHERE t.digit_map IS NULL
          AND t.status != 'new'
          AND (t.summary IS NOT NULL
               OR EXISTS (SELECT 1 FROM call_records c
                          WHERE c.target_id = t.id AND c.transcript IS NOT NULL AND c.transcript != ''))
        ORDER BY t.id
        "#,
        TARGET_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_target).collect()
}

pub async fn set_idle_cycles(pool: &SqlitePool, id: i64, idle_cycles: i64) -> Result<()> {
    sqlx::query("UPDATE targets SET idle_cycles = ? WHERE id = ?")
        .bind(idle_cycles)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Most recently created targets first
pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<Target>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM targets ORDER BY created_at DESC, id DESC LIMIT ?",
        TARGET_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_target).collect()
}
