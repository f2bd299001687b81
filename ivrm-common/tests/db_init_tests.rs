//! Database initialization tests: file creation, reopen, constraints

use ivrm_common::db::init::init_database;
use ivrm_common::time::db_now;
use sqlx::Row;
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("ivrm.db");

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("ivrm.db");

    let pool1 = init_database(&db_path).await.unwrap();
    sqlx::query("INSERT INTO targets (dial_string, created_at, updated_at) VALUES ('18005551234', ?, ?)")
        .bind(db_now())
        .bind(db_now())
        .execute(&pool1)
        .await
        .unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM targets")
        .fetch_one(&pool2)
        .await
        .unwrap();
    assert_eq!(count, 1, "Existing rows must survive re-initialization");
}

#[tokio::test]
async fn test_all_tables_created() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("ivrm.db")).await.unwrap();

    let rows = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .fetch_all(&pool)
        .await
        .unwrap();
    let names: Vec<String> = rows.iter().map(|r| r.get("name")).collect();

    for table in ["targets", "sequences", "call_records", "queue_items", "schema_version"] {
        assert!(names.iter().any(|n| n == table), "missing table {}", table);
    }
}

#[tokio::test]
async fn test_queue_payload_unique_per_target() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("ivrm.db")).await.unwrap();
    let now = db_now();

    let target_id: i64 = sqlx::query_scalar(
        "INSERT INTO targets (dial_string, created_at, updated_at) VALUES ('18005551234', ?, ?) RETURNING id",
    )
    .bind(&now)
    .bind(&now)
    .fetch_one(&pool)
    .await
    .unwrap();

    let insert = "INSERT INTO queue_items (target_id, payload, created_at, updated_at) VALUES (?, '[]', ?, ?)";
    sqlx::query(insert).bind(target_id).bind(&now).bind(&now).execute(&pool).await.unwrap();
    let second = sqlx::query(insert).bind(target_id).bind(&now).bind(&now).execute(&pool).await;
    assert!(second.is_err(), "Duplicate (target_id, payload) must be rejected");
}

#[tokio::test]
async fn test_foreign_keys_cascade_on_every_connection() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("ivrm.db")).await.unwrap();
    let now = db_now();

    let target_id: i64 = sqlx::query_scalar(
        "INSERT INTO targets (dial_string, created_at, updated_at) VALUES ('18005550000', ?, ?) RETURNING id",
    )
    .bind(&now)
    .bind(&now)
    .fetch_one(&pool)
    .await
    .unwrap();

    sqlx::query("INSERT INTO sequences (target_id, digits, level, created_at) VALUES (?, '[\"1\"]', 1, ?)")
        .bind(target_id)
        .bind(&now)
        .execute(&pool)
        .await
        .unwrap();

    // Hold a second connection so the delete may run on a different one
    let _held = pool.acquire().await.unwrap();
    sqlx::query("DELETE FROM targets WHERE id = ?")
        .bind(target_id)
        .execute(&pool)
        .await
        .unwrap();

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sequences")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn test_invalid_status_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("ivrm.db")).await.unwrap();

    let result = sqlx::query(
        "INSERT INTO targets (dial_string, status, created_at, updated_at) VALUES ('1', 'dialing', ?, ?)",
    )
    .bind(db_now())
    .bind(db_now())
    .execute(&pool)
    .await;
    assert!(result.is_err());
}
