//! Sequence persistence
//!
//! `(target_id, digits)` is unique; inserts go through `ON CONFLICT DO
//! NOTHING` so concurrent discoverers of the same path never fail.

use ivrm_common::time::{db_now, parse_db_timestamp};
use ivrm_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use std::collections::HashSet;

use crate::models::{DigitPath, Sequence};

fn row_to_sequence(row: &SqliteRow) -> Result<Sequence> {
    let digits: String = row.get("digits");
    let created_at: String = row.get("created_at");

    Ok(Sequence {
        id: row.get("id"),
        target_id: row.get("target_id"),
        digits: DigitPath::from_canonical_json(&digits)?,
        description: row.get("description"),
        level: row.get("level"),
        is_submenu: row.get("is_submenu"),
        explored: row.get("explored"),
        created_at: parse_db_timestamp(&created_at)?,
    })
}

/// Insert a sequence unless the path already exists for the target
///
/// Returns whether a row was inserted.
pub async fn insert_if_absent<'e, E>(
    executor: E,
    target_id: i64,
    digits: &DigitPath,
    description: &str,
    is_submenu: bool,
    explored: bool,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO sequences (target_id, digits, description, level, is_submenu, explored, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(target_id, digits) DO NOTHING
        "#,
    )
    .bind(target_id)
    .bind(digits.to_canonical_json()?)
    .bind(description)
    .bind(digits.level() as i64)
    .bind(is_submenu)
    .bind(explored)
    .bind(db_now())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn list_for_target<'e, E>(executor: E, target_id: i64) -> Result<Vec<Sequence>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        r#"
        SELECT id, target_id, digits, description, level, is_submenu, explored, created_at
        FROM sequences
        WHERE target_id = ?
        ORDER BY level, id
        "#,
    )
    .bind(target_id)
    .fetch_all(executor)
    .await?;

    rows.iter().map(row_to_sequence).collect()
}

/// All known paths for a target (the exploration dedup set)
pub async fn existing_paths(pool: &SqlitePool, target_id: i64) -> Result<HashSet<DigitPath>> {
    Ok(list_for_target(pool, target_id)
        .await?
        .into_iter()
        .map(|s| s.digits)
        .collect())
}

/// Paths already scheduled for a call
pub async fn explored_paths(pool: &SqlitePool, target_id: i64) -> Result<HashSet<DigitPath>> {
    Ok(list_for_target(pool, target_id)
        .await?
        .into_iter()
        .filter(|s| s.explored)
        .map(|s| s.digits)
        .collect())
}

/// Paths known to lead to a submenu, shallowest first
pub async fn submenu_paths(pool: &SqlitePool, target_id: i64) -> Result<Vec<DigitPath>> {
    Ok(list_for_target(pool, target_id)
        .await?
        .into_iter()
        .filter(|s| s.is_submenu)
        .map(|s| s.digits)
        .collect())
}

/// Oldest unexplored sequences across all targets, shallowest first
pub async fn list_unexplored(pool: &SqlitePool, limit: i64) -> Result<Vec<Sequence>> {
    let rows = sqlx::query(
        r#"
        SELECT id, target_id, digits, description, level, is_submenu, explored, created_at
        FROM sequences
        WHERE explored = 0
        ORDER BY level, id
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_sequence).collect()
}

pub async fn count_unexplored_for_target(pool: &SqlitePool, target_id: i64) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sequences WHERE target_id = ? AND explored = 0")
            .bind(target_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// Returns whether the row was still unexplored
pub async fn mark_explored<'e, E>(executor: E, id: i64) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE sequences SET explored = 1 WHERE id = ? AND explored = 0")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn delete_for_target<'e, E>(executor: E, target_id: i64) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM sequences WHERE target_id = ?")
        .bind(target_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
