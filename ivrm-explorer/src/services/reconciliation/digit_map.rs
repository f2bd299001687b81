//! Digit-map refresh
//!
//! Builds a target's digit map from its summary and every transcript,
//! stores it, and makes sure each mapped option has a sequence row.
//!
//! - Periodic mode: targets that never got a map. Existing sequences are
//!   kept; mapped paths are added (unexplored) if missing.
//! - On-demand mode (`rebuild_digit_map`): one target, sequences cleared
//!   and recreated from the map. Paths that were already explored stay
//!   explored and are kept, so a rebuild never re-dials or forgets them.

use ivrm_common::{Error, Result};

use super::PassContext;
use crate::db;
use crate::models::{DigitMap, DigitPath, MenuOption, OptionSource, Target};
use crate::services::exploration::merge_digit_map;
use crate::utils::{begin_immediate, begin_monitored, retry_on_lock};

/// Returns the number of targets that got a map
pub async fn run_digit_map_pass(ctx: &PassContext) -> Result<usize> {
    let targets = db::targets::targets_without_digit_map(&ctx.pool).await?;
    let mut mapped = 0;

    for target in targets {
        match refresh_periodic(ctx, &target).await {
            Ok(()) => mapped += 1,
            Err(e) => {
                tracing::warn!(target_id = target.id, error = %e, "Digit-map refresh failed");
            }
        }
    }

    Ok(mapped)
}

/// On-demand rebuild for one target
///
/// Returns the stored map. An empty extraction leaves the existing map and
/// sequences untouched.
pub async fn rebuild_digit_map(ctx: &PassContext, target_id: i64) -> Result<DigitMap> {
    let target = db::targets::get_target(&ctx.pool, target_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("target {}", target_id)))?;

    let map = build_map(ctx, &target).await?;
    if map.is_empty() {
        tracing::info!(target_id, "No menu options found, keeping existing digit map");
        return Ok(target.digit_map.unwrap_or_default());
    }

    let entries = mapped_paths(&map);

    // Explored paths are read under the write reservation so a path stored
    // by a concurrent exploration cannot slip between the read and the DELETE
    retry_on_lock("digit_map::rebuild", ctx.max_lock_wait_ms, || async {
        let mut tx = begin_immediate(&ctx.pool, "digit_map::rebuild").await?;
        let explored: Vec<_> = db::sequences::list_for_target(tx.conn(), target_id)
            .await?
            .into_iter()
            .filter(|s| s.explored)
            .collect();
        let removed = db::sequences::delete_for_target(tx.conn(), target_id).await?;

        for (path, action, submenu) in &entries {
            let was_explored = explored.iter().any(|s| &s.digits == path);
            db::sequences::insert_if_absent(
                tx.conn(),
                target_id,
                path,
                action,
                *submenu,
                was_explored,
            )
            .await?;
        }
        for sequence in &explored {
            db::sequences::insert_if_absent(
                tx.conn(),
                target_id,
                &sequence.digits,
                &sequence.description,
                sequence.is_submenu,
                true,
            )
            .await?;
        }

        db::targets::set_digit_map(tx.conn(), target_id, &map).await?;
        tx.commit().await?;

        tracing::info!(
            target_id,
            removed,
            mapped = entries.len(),
            kept_explored = explored.len(),
            "Digit map rebuilt"
        );
        Ok(())
    })
    .await?;

    Ok(map)
}

async fn refresh_periodic(ctx: &PassContext, target: &Target) -> Result<()> {
    let map = build_map(ctx, target).await?;
    let entries = mapped_paths(&map);

    retry_on_lock("digit_map::refresh", ctx.max_lock_wait_ms, || async {
        let mut tx = begin_monitored(&ctx.pool, "digit_map::refresh").await?;
        for (path, action, submenu) in &entries {
            db::sequences::insert_if_absent(tx.conn()?, target.id, path, action, *submenu, false)
                .await?;
        }
        // Stored even when empty so the target is not re-analyzed every pass
        db::targets::set_digit_map(tx.conn()?, target.id, &map).await?;
        tx.commit().await
    })
    .await?;

    tracing::info!(target_id = target.id, mapped = map.len(), "Digit map stored");
    Ok(())
}

/// Extract options from the summary and every transcript, then merge
async fn build_map(ctx: &PassContext, target: &Target) -> Result<DigitMap> {
    let summary_options: Vec<MenuOption> = match &target.summary {
        Some(summary) if !summary.trim().is_empty() => {
            ctx.exploration
                .fetch_options(summary, &DigitPath::root(), OptionSource::Summary)
                .await
        }
        _ => Vec::new(),
    };

    let mut transcript_options = Vec::new();
    for record in db::call_records::list_for_target(&ctx.pool, target.id).await? {
        let Some(transcript) = record.transcript.as_deref() else {
            continue;
        };
        if transcript.trim().is_empty() {
            continue;
        }
        transcript_options.extend(
            ctx.exploration
                .fetch_options(transcript, &record.payload.path(), OptionSource::Transcript)
                .await,
        );
    }

    Ok(merge_digit_map(&summary_options, &transcript_options))
}

/// Map labels back to paths; labels that no longer parse are skipped
fn mapped_paths(map: &DigitMap) -> Vec<(DigitPath, String, bool)> {
    map.iter()
        .filter_map(|(label, entry)| match DigitPath::parse_hyphenated(label) {
            Ok(path) => Some((path, entry.action.clone(), entry.submenu)),
            Err(e) => {
                tracing::warn!(label = %label, error = %e, "Skipping unparseable digit-map key");
                None
            }
        })
        .collect()
}
