//! Seed pass: start exploring new targets
//!
//! Each `new` target gets one root item (empty payload: dial and listen)
//! and moves to `in_progress`.

use ivrm_common::Result;

use super::PassContext;
use crate::db;
use crate::models::{DialPayload, TargetStatus};

/// Returns the number of targets moved to `in_progress`
pub async fn run_seed_pass(ctx: &PassContext) -> Result<usize> {
    let targets = db::targets::list_targets_by_status(&ctx.pool, TargetStatus::New).await?;
    let mut seeded = 0;

    for target in targets {
        if let Err(e) = ctx.queue.enqueue(target.id, &DialPayload::empty()).await {
            tracing::error!(target_id = target.id, error = %e, "Failed to enqueue root call");
            continue;
        }

        match db::targets::transition_status(
            &ctx.pool,
            target.id,
            TargetStatus::New,
            TargetStatus::InProgress,
        )
        .await
        {
            Ok(true) => {
                tracing::info!(
                    target_id = target.id,
                    dial_string = %target.dial_string,
                    "Target seeded"
                );
                seeded += 1;
            }
            Ok(false) => {
                tracing::debug!(target_id = target.id, "Target left 'new' concurrently");
            }
            Err(e) => {
                tracing::error!(target_id = target.id, error = %e, "Failed to start target");
            }
        }
    }

    Ok(seeded)
}
