//! Queue manager
//!
//! Owns the item lifecycle: `pending → processing → (deleted)`.
//!
//! - Enqueue is idempotent through the `(target_id, payload)` unique key.
//! - Claim runs under `BEGIN IMMEDIATE`, so at most one worker can flip a
//!   given item to `processing`.
//! - Completion and failure delete the item; failure text is kept on the
//!   owning target.

use chrono::Utc;
use ivrm_common::Result;
use sqlx::SqlitePool;

use crate::db;
use crate::models::{DialPayload, QueueItem};
use crate::utils::{begin_immediate, begin_monitored, retry_on_lock};

/// Outcome of one reclaim sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimSummary {
    pub released: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct QueueManager {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl QueueManager {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns whether a new item was created
    pub async fn enqueue(&self, target_id: i64, payload: &DialPayload) -> Result<bool> {
        let inserted = retry_on_lock("queue::enqueue", self.max_lock_wait_ms, || async {
            db::queue::insert_if_absent(&self.pool, target_id, payload).await
        })
        .await?;

        if inserted {
            tracing::debug!(target_id, path = %payload.path(), "Queue item created");
        }
        Ok(inserted)
    }

    /// Take the oldest pending item, if any
    ///
    /// The item is committed as `processing` before it is returned, so the
    /// caller may spend as long as it likes on the call itself.
    pub async fn claim_next(&self) -> Result<Option<QueueItem>> {
        retry_on_lock("queue::claim_next", self.max_lock_wait_ms, || async {
            let mut tx = begin_immediate(&self.pool, "queue::claim_next").await?;
            match db::queue::claim_oldest_pending(tx.conn()).await {
                Ok(item) => {
                    tx.commit().await?;
                    Ok(item)
                }
                Err(e) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        tracing::warn!(error = %rollback_err, "Claim rollback failed");
                    }
                    Err(e)
                }
            }
        })
        .await
    }

    pub async fn complete(&self, item: &QueueItem) -> Result<()> {
        let deleted = retry_on_lock("queue::complete", self.max_lock_wait_ms, || async {
            db::queue::delete_item(&self.pool, item.id).await
        })
        .await?;

        if !deleted {
            tracing::warn!(item_id = item.id, "Completed item was already gone");
        }
        Ok(())
    }

    /// Record the failure on the target, then drop the item
    pub async fn fail(&self, item: &QueueItem, error: &str) -> Result<()> {
        tracing::warn!(
            item_id = item.id,
            target_id = item.target_id,
            attempts = item.attempts,
            path = %item.payload.path(),
            error,
            "Queue item failed"
        );

        retry_on_lock("queue::fail", self.max_lock_wait_ms, || async {
            let mut tx = begin_monitored(&self.pool, "queue::fail").await?;
            db::targets::record_dial_error(tx.conn()?, item.target_id, error).await?;
            db::queue::delete_item(tx.conn()?, item.id).await?;
            tx.commit().await
        })
        .await
    }

    /// Recover items whose worker died mid-dispatch
    ///
    /// Items in `processing` for longer than `older_than` go back to
    /// `pending` while `attempts < max_attempts`; the rest are failed.
    pub async fn reclaim_abandoned(
        &self,
        older_than: chrono::Duration,
        max_attempts: i64,
    ) -> Result<ReclaimSummary> {
        let cutoff = Utc::now() - older_than;

        let summary = retry_on_lock("queue::reclaim_abandoned", self.max_lock_wait_ms, || async {
            let mut summary = ReclaimSummary::default();
            let mut tx = begin_monitored(&self.pool, "queue::reclaim_abandoned").await?;

            let stuck = db::queue::list_processing_before(tx.conn()?, cutoff).await?;
            for item in stuck {
                if item.attempts < max_attempts {
                    if db::queue::release_to_pending(tx.conn()?, item.id).await? {
                        summary.released += 1;
                    }
                } else {
                    let error = format!(
                        "abandoned in processing after {} attempts",
                        item.attempts
                    );
                    db::targets::record_dial_error(tx.conn()?, item.target_id, &error).await?;
                    db::queue::delete_item(tx.conn()?, item.id).await?;
                    summary.failed += 1;
                }
            }

            tx.commit().await?;
            Ok(summary)
        })
        .await?;

        if summary.released > 0 || summary.failed > 0 {
            tracing::info!(
                released = summary.released,
                failed = summary.failed,
                "Reclaimed abandoned queue items"
            );
        }
        Ok(summary)
    }

    pub async fn pending_count(&self) -> Result<i64> {
        db::queue::count_pending(&self.pool).await
    }

    /// Pending plus processing items for one target
    pub async fn live_count_for_target(&self, target_id: i64) -> Result<i64> {
        db::queue::count_live_for_target(&self.pool, target_id).await
    }
}
