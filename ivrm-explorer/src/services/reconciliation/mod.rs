//! Reconciliation passes
//!
//! Each pass is an independent, idempotent unit of work that the scheduler
//! runs on its own interval. Passes may overlap with each other (and
//! dispatch with itself); the database is the only shared state. A pass
//! logs and skips per-target/per-item failures and only returns an error
//! when it cannot make progress at all (e.g. the database is unreachable).

pub mod backfill;
pub mod convergence;
pub mod digit_map;
pub mod dispatch;
pub mod seed;
pub mod stalled;
pub mod summary;
pub mod tree_seed;

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::{ExplorationConfig, ExplorerConfig, RecoveryConfig};
use crate::services::call_executor_client::CallExecutor;
use crate::services::exploration::ExplorationEngine;
use crate::services::menu_analysis_client::MenuAnalyzer;
use crate::services::queue_manager::QueueManager;
use crate::services::recording_store::RecordingStore;

pub use backfill::run_backfill_pass;
pub use convergence::{run_convergence_pass, ConvergenceReport};
pub use digit_map::{rebuild_digit_map, run_digit_map_pass};
pub use dispatch::{run_dispatch_pass, DispatchOutcome};
pub use seed::run_seed_pass;
pub use stalled::{run_stalled_pass, StalledReport};
pub use summary::run_summary_pass;
pub use tree_seed::run_tree_seed_pass;

/// Everything a pass needs, cheap to clone into each task
#[derive(Clone)]
pub struct PassContext {
    pub pool: SqlitePool,
    pub queue: QueueManager,
    pub exploration: ExplorationEngine,
    pub executor: Arc<dyn CallExecutor>,
    pub analyzer: Arc<dyn MenuAnalyzer>,
    pub recordings: RecordingStore,
    pub exploration_config: ExplorationConfig,
    pub recovery: RecoveryConfig,
    pub max_lock_wait_ms: u64,
}

impl PassContext {
    pub fn new(
        pool: SqlitePool,
        executor: Arc<dyn CallExecutor>,
        analyzer: Arc<dyn MenuAnalyzer>,
        recordings: RecordingStore,
        config: &ExplorerConfig,
    ) -> Self {
        let max_lock_wait_ms = config.database.max_lock_wait_ms;
        let queue = QueueManager::new(pool.clone(), max_lock_wait_ms);
        let exploration = ExplorationEngine::new(
            pool.clone(),
            Arc::clone(&analyzer),
            queue.clone(),
            config.exploration.dial_delay_secs,
            config.exploration.max_depth,
        );

        Self {
            pool,
            queue,
            exploration,
            executor,
            analyzer,
            recordings,
            exploration_config: config.exploration.clone(),
            recovery: config.recovery.clone(),
            max_lock_wait_ms,
        }
    }
}
