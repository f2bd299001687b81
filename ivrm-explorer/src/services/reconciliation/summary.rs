//! Summary refresh pass
//!
//! Aggregates every transcript of an in-progress target into a summary,
//! then rebuilds the target's digit map from it. Targets with no
//! transcript newer than their summary are skipped.

use ivrm_common::time::now;
use ivrm_common::Result;

use super::{rebuild_digit_map, PassContext};
use crate::db;
use crate::models::{Target, TargetStatus};

/// Returns the number of summaries stored
pub async fn run_summary_pass(ctx: &PassContext) -> Result<usize> {
    let targets = db::targets::list_targets_by_status(&ctx.pool, TargetStatus::InProgress).await?;
    let mut refreshed = 0;

    for target in targets {
        match refresh_summary(ctx, &target).await {
            Ok(true) => refreshed += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(target_id = target.id, error = %e, "Summary refresh failed");
            }
        }
    }

    Ok(refreshed)
}

pub async fn refresh_summary(ctx: &PassContext, target: &Target) -> Result<bool> {
    if !db::call_records::has_transcripts_since(&ctx.pool, target.id, target.summary_updated_at)
        .await?
    {
        return Ok(false);
    }

    let transcripts = db::call_records::transcripts_for_target(&ctx.pool, target.id).await?;
    if transcripts.is_empty() {
        return Ok(false);
    }

    // Taken before the request so transcripts stored meanwhile trigger the next refresh
    let started_at = now();
    let summary = match ctx.analyzer.summarize(&target.dial_string, &transcripts).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::warn!(target_id = target.id, error = %e, "Summarization failed");
            return Ok(false);
        }
    };

    db::targets::set_summary(&ctx.pool, target.id, summary.trim(), started_at).await?;
    tracing::info!(
        target_id = target.id,
        transcripts = transcripts.len(),
        "Summary stored"
    );

    rebuild_digit_map(ctx, target.id).await?;
    Ok(true)
}
