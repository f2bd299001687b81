//! Call-dispatch pass: one queued item per invocation
//!
//! The claim commits before the call is placed, so no transaction is held
//! across the (slow) executor request.

use ivrm_common::Result;

use super::PassContext;
use crate::db;
use crate::models::QueueItem;
use crate::utils::{begin_monitored, retry_on_lock};

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Nothing pending
    Idle,
    /// Call placed and recorded
    Completed { item_id: i64, record_id: i64 },
    /// Item dropped with an error recorded on the target
    Failed { item_id: i64, error: String },
    /// Target no longer being explored; item dropped without a call
    Skipped { item_id: i64 },
}

pub async fn run_dispatch_pass(ctx: &PassContext) -> Result<DispatchOutcome> {
    let item = match ctx.queue.claim_next().await? {
        Some(item) => item,
        None => return Ok(DispatchOutcome::Idle),
    };

    tracing::info!(
        item_id = item.id,
        target_id = item.target_id,
        attempt = item.attempts,
        path = %item.payload.path(),
        "Dispatching call"
    );

    let target = match db::targets::get_target(&ctx.pool, item.target_id).await {
        Ok(Some(target)) => target,
        Ok(None) => return fail(ctx, &item, "target no longer exists".to_string()).await,
        Err(e) => return fail(ctx, &item, format!("failed to load target: {}", e)).await,
    };

    if target.status.is_terminal() {
        tracing::info!(
            item_id = item.id,
            target_id = target.id,
            status = %target.status,
            "Dropping item for finished target"
        );
        ctx.queue.complete(&item).await?;
        return Ok(DispatchOutcome::Skipped { item_id: item.id });
    }

    let outcome = match ctx.executor.place_call(&target.dial_string, &item.payload).await {
        Ok(outcome) => outcome,
        Err(e) => return fail(ctx, &item, e.to_string()).await,
    };

    let record_id = retry_on_lock("dispatch::record_call", ctx.max_lock_wait_ms, || async {
        let mut tx = begin_monitored(&ctx.pool, "dispatch::record_call").await?;
        let record_id = db::call_records::insert_record(
            tx.conn()?,
            item.target_id,
            &outcome.recording_id,
            &item.payload,
            outcome.duration_secs,
        )
        .await?;
        db::queue::delete_item(tx.conn()?, item.id).await?;
        tx.commit().await?;
        Ok(record_id)
    })
    .await;

    match record_id {
        Ok(record_id) => {
            tracing::info!(
                item_id = item.id,
                record_id,
                recording_id = %outcome.recording_id,
                "Call recorded"
            );
            Ok(DispatchOutcome::Completed {
                item_id: item.id,
                record_id,
            })
        }
        Err(e) => fail(ctx, &item, format!("failed to store call record: {}", e)).await,
    }
}

async fn fail(ctx: &PassContext, item: &QueueItem, error: String) -> Result<DispatchOutcome> {
    ctx.queue.fail(item, &error).await?;
    Ok(DispatchOutcome::Failed {
        item_id: item.id,
        error,
    })
}
