//! Stalled-work detection
//!
//! Two kinds of stuck work are recovered here:
//! - call records that never got a usable transcript within
//!   `stalled_after` are deleted and their exact payload re-queued
//! - queue items abandoned in `processing` are released or failed

use chrono::Utc;
use ivrm_common::Result;

use super::PassContext;
use crate::db;
use crate::models::CallAttemptRecord;
use crate::services::queue_manager::ReclaimSummary;
use crate::utils::{begin_monitored, retry_on_lock};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StalledReport {
    /// Records deleted and re-queued
    pub requeued: usize,
    pub reclaimed: ReclaimSummary,
}

pub async fn run_stalled_pass(ctx: &PassContext) -> Result<StalledReport> {
    let reclaimed = ctx
        .queue
        .reclaim_abandoned(ctx.recovery.claim_timeout(), ctx.recovery.max_attempts)
        .await?;

    let cutoff = Utc::now() - ctx.recovery.stalled_after();
    let stalled =
        db::call_records::list_stalled(&ctx.pool, cutoff, ctx.recovery.min_transcript_len).await?;

    let mut requeued = 0;
    for record in stalled {
        match requeue_record(ctx, &record).await {
            Ok(true) => requeued += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    record_id = record.id,
                    error = %e,
                    "Failed to re-queue stalled record"
                );
            }
        }
    }

    if requeued > 0 {
        tracing::info!(requeued, "Re-queued stalled call records");
    }
    Ok(StalledReport {
        requeued,
        reclaimed,
    })
}

/// Delete the record and enqueue its payload in one transaction
async fn requeue_record(ctx: &PassContext, record: &CallAttemptRecord) -> Result<bool> {
    retry_on_lock("stalled::requeue_record", ctx.max_lock_wait_ms, || async {
        let mut tx = begin_monitored(&ctx.pool, "stalled::requeue_record").await?;
        if !db::call_records::delete_record(tx.conn()?, record.id).await? {
            tx.rollback().await?;
            return Ok(false);
        }
        db::queue::insert_if_absent(tx.conn()?, record.target_id, &record.payload).await?;
        tx.commit().await?;

        tracing::info!(
            record_id = record.id,
            target_id = record.target_id,
            path = %record.payload.path(),
            "Stalled record re-queued"
        );
        Ok(true)
    })
    .await
}
