//! Transcription backfill pass
//!
//! For each record still lacking a transcript: stage the recording,
//! transcribe it, store the text (first writer wins) and feed it to the
//! exploration engine with the record's dialed path as context. Up to
//! `backfill_concurrency` records are processed at once.

use futures::stream::{self, StreamExt};
use ivrm_common::Result;

use super::PassContext;
use crate::db;
use crate::models::{CallAttemptRecord, OptionSource};

/// Returns the number of transcripts stored
pub async fn run_backfill_pass(ctx: &PassContext) -> Result<usize> {
    let batch = ctx.exploration_config.backfill_batch;
    let records = db::call_records::list_untranscribed(&ctx.pool, batch).await?;

    let results: Vec<(CallAttemptRecord, Result<bool>)> = stream::iter(records)
        .map(|record| async move {
            let result = backfill_record(ctx, &record).await;
            (record, result)
        })
        .buffer_unordered(ctx.exploration_config.backfill_concurrency)
        .collect()
        .await;

    let mut stored = 0;
    for (record, result) in results {
        match result {
            Ok(true) => stored += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    record_id = record.id,
                    target_id = record.target_id,
                    error = %e,
                    "Transcription backfill failed"
                );
            }
        }
    }

    Ok(stored)
}

async fn backfill_record(ctx: &PassContext, record: &CallAttemptRecord) -> Result<bool> {
    let audio = ctx.recordings.stage(&record.recording_id).await?;

    let transcript = match ctx.analyzer.transcribe(&record.recording_id, audio).await {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            tracing::warn!(record_id = record.id, error = %e, "Transcription failed");
            return Ok(false);
        }
    };

    if !db::call_records::set_transcript_if_empty(&ctx.pool, record.id, &transcript).await? {
        tracing::debug!(record_id = record.id, "Transcript already stored by another worker");
        return Ok(false);
    }

    tracing::info!(
        record_id = record.id,
        target_id = record.target_id,
        chars = transcript.chars().count(),
        "Transcript stored"
    );

    if !transcript.is_empty() {
        ctx.exploration
            .extract_new_sequences(
                record.target_id,
                &transcript,
                &record.payload.path(),
                OptionSource::Transcript,
            )
            .await?;
    }

    Ok(true)
}
