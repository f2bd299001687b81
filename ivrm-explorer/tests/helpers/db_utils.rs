//! Database and pass-context setup for integration tests

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

use ivrm_common::db::init_database;
use ivrm_explorer::config::ExplorerConfig;
use ivrm_explorer::models::Target;
use ivrm_explorer::services::{PassContext, RecordingStore};

use super::fakes::{FakeAnalyzer, FakeExecutor};

/// Create temporary test database with the full schema
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("ivrm.db");
    let pool = init_database(&db_path).await?;
    Ok((temp_dir, pool))
}

/// Create a target and return it
pub async fn insert_target(pool: &SqlitePool, dial_string: &str) -> Result<Target> {
    let (target, _) = ivrm_explorer::db::targets::get_or_create_target(pool, dial_string).await?;
    Ok(target)
}

/// Everything a reconciliation test needs, wired to fakes
pub struct TestHarness {
    pub temp_dir: TempDir,
    pub pool: SqlitePool,
    pub config: ExplorerConfig,
    pub executor: Arc<FakeExecutor>,
    pub analyzer: Arc<FakeAnalyzer>,
    pub ctx: PassContext,
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        Self::with_config(ExplorerConfig::default()).await
    }

    pub async fn with_config(config: ExplorerConfig) -> Result<Self> {
        let (temp_dir, pool) = create_test_db().await?;

        let recordings = config.recordings.resolve(temp_dir.path());
        std::fs::create_dir_all(&recordings.source_dir)?;

        let executor = Arc::new(FakeExecutor::new(recordings.source_dir.clone()));
        let analyzer = Arc::new(FakeAnalyzer::new());
        let store = RecordingStore::new(recordings.source_dir, recordings.serve_dir);

        let ctx = PassContext::new(
            pool.clone(),
            executor.clone(),
            analyzer.clone(),
            store,
            &config,
        );

        Ok(Self {
            temp_dir,
            pool,
            config,
            executor,
            analyzer,
            ctx,
        })
    }
}
