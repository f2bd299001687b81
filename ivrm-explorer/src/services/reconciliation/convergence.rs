//! Convergence pass: finish targets with nothing left to explore
//!
//! A target is quiescent when it has no live queue item, no unexplored
//! sequence, no record waiting for a transcript, and no transcript newer
//! than its summary. After `converge_after_cycles` consecutive quiescent
//! passes it becomes `completed` (at least one transcript) or `failed`.

use ivrm_common::Result;

use super::PassContext;
use crate::db;
use crate::models::{Target, TargetStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvergenceReport {
    pub completed: usize,
    pub failed: usize,
    /// Quiescent but not yet for long enough
    pub idle: usize,
}

pub async fn run_convergence_pass(ctx: &PassContext) -> Result<ConvergenceReport> {
    let targets = db::targets::list_targets_by_status(&ctx.pool, TargetStatus::InProgress).await?;
    let mut report = ConvergenceReport::default();

    for target in targets {
        if let Err(e) = check_target(ctx, &target, &mut report).await {
            tracing::warn!(target_id = target.id, error = %e, "Convergence check failed");
        }
    }

    Ok(report)
}

pub async fn is_quiescent(ctx: &PassContext, target: &Target) -> Result<bool> {
    if ctx.queue.live_count_for_target(target.id).await? > 0 {
        return Ok(false);
    }
    if db::sequences::count_unexplored_for_target(&ctx.pool, target.id).await? > 0 {
        return Ok(false);
    }
    if db::call_records::count_untranscribed_for_target(&ctx.pool, target.id).await? > 0 {
        return Ok(false);
    }
    let summary_stale =
        db::call_records::has_transcripts_since(&ctx.pool, target.id, target.summary_updated_at)
            .await?;
    Ok(!summary_stale)
}

async fn check_target(
    ctx: &PassContext,
    target: &Target,
    report: &mut ConvergenceReport,
) -> Result<()> {
    if !is_quiescent(ctx, target).await? {
        if target.idle_cycles != 0 {
            db::targets::set_idle_cycles(&ctx.pool, target.id, 0).await?;
        }
        return Ok(());
    }

    let idle_cycles = target.idle_cycles + 1;
    if idle_cycles < ctx.recovery.converge_after_cycles {
        db::targets::set_idle_cycles(&ctx.pool, target.id, idle_cycles).await?;
        report.idle += 1;
        return Ok(());
    }

    let transcribed = db::call_records::count_transcribed_for_target(&ctx.pool, target.id).await?;
    let next = if transcribed > 0 {
        TargetStatus::Completed
    } else {
        TargetStatus::Failed
    };

    if db::targets::transition_status(&ctx.pool, target.id, TargetStatus::InProgress, next).await? {
        tracing::info!(
            target_id = target.id,
            dial_string = %target.dial_string,
            status = %next,
            transcribed,
            "Target converged"
        );
        match next {
            TargetStatus::Completed => report.completed += 1,
            _ => report.failed += 1,
        }
    }
    Ok(())
}
