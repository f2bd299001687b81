//! Tree seeding pass: schedule calls for known but untried paths
//!
//! Sequences created by digit-map refresh (or by an operator) start
//! unexplored; this pass gives each one a queue item, shallowest first.

use ivrm_common::Result;

use super::PassContext;
use crate::db;
use crate::models::{DialPayload, Sequence};
use crate::utils::{begin_monitored, retry_on_lock};

/// Returns the number of sequences scheduled
pub async fn run_tree_seed_pass(ctx: &PassContext) -> Result<usize> {
    let sequences =
        db::sequences::list_unexplored(&ctx.pool, ctx.exploration_config.tree_seed_batch).await?;
    let mut scheduled = 0;

    for sequence in sequences {
        match seed_sequence(ctx, &sequence).await {
            Ok(true) => scheduled += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    sequence_id = sequence.id,
                    error = %e,
                    "Failed to schedule sequence"
                );
            }
        }
    }

    if scheduled > 0 {
        tracing::info!(scheduled, "Scheduled unexplored sequences");
    }
    Ok(scheduled)
}

/// Enqueue and mark explored together, so a sequence is never marked
/// without its call or scheduled twice
async fn seed_sequence(ctx: &PassContext, sequence: &Sequence) -> Result<bool> {
    let payload = DialPayload::from_path(&sequence.digits, ctx.exploration_config.dial_delay_secs);

    retry_on_lock("tree_seed::seed_sequence", ctx.max_lock_wait_ms, || async {
        let mut tx = begin_monitored(&ctx.pool, "tree_seed::seed_sequence").await?;
        if !db::sequences::mark_explored(tx.conn()?, sequence.id).await? {
            // Another worker got here first
            tx.rollback().await?;
            return Ok(false);
        }
        db::queue::insert_if_absent(tx.conn()?, sequence.target_id, &payload).await?;
        tx.commit().await?;
        Ok(true)
    })
    .await
}
