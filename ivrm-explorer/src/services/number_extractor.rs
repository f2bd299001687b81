//! Phone number ingestion from free text
//!
//! Finds dial strings in pasted text (emails, notes, web pages) and turns
//! them into targets.

use regex::Regex;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::OnceLock;

use ivrm_common::Result;

use crate::db;
use crate::models::TargetStatus;

/// Longest dial string accepted
pub const MAX_DIAL_STRING_LEN: usize = 20;

/// Shortest digit run treated as a phone number
pub const MIN_DIAL_DIGITS: usize = 7;

/// Most digits in one E.164 number
const MAX_NUMBER_DIGITS: usize = 15;

/// Separators stay on one line; a newline always ends a number
fn phone_like() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\+?\(?\d[\d \t().\-]*\d").expect("Failed to compile regex")
    })
}

fn digit_count(s: &str) -> usize {
    s.chars().filter(|c| c.is_ascii_digit()).count()
}

/// Full North American number: 10 digits, or 11 with the leading `1`
fn is_complete_nanp(s: &str) -> bool {
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    (digits.len() == 10 && !digits.starts_with('1'))
        || (digits.len() == 11 && digits.starts_with('1'))
}

/// Split a match holding more digits than one number can have
///
/// Space-separated chunks are regrouped into numbers: a group closes once
/// it forms a full North American number or the next chunk would push it
/// past 11 digits.
fn split_joined(run: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for chunk in run.split_whitespace() {
        if !current.is_empty() && digit_count(&current) + digit_count(chunk) > 11 {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(chunk);
        if is_complete_nanp(&current) {
            pieces.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Normalize one phone-like match: separators and `+` removed, US
/// 10-digit numbers given the `1` country prefix
pub fn normalize_dial_string(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() < MIN_DIAL_DIGITS {
        return None;
    }
    let normalized = if digits.len() == 10 {
        format!("1{}", digits)
    } else {
        digits
    };
    if normalized.len() > MAX_DIAL_STRING_LEN {
        tracing::warn!(number = %normalized, "Skipping number: too long");
        return None;
    }
    Some(normalized)
}

/// Every distinct dial string in `text`, in order of appearance
pub fn extract_dial_strings(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for m in phone_like().find_iter(text) {
        let pieces = if digit_count(m.as_str()) > MAX_NUMBER_DIGITS {
            split_joined(m.as_str())
        } else {
            vec![m.as_str().to_string()]
        };
        for piece in pieces {
            if let Some(dial) = normalize_dial_string(&piece) {
                if !found.contains(&dial) {
                    found.push(dial);
                }
            }
        }
    }
    found
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestAction {
    /// New target created
    Created,
    /// Finished target sent back to `new`
    Reset,
    /// Already waiting or being explored
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub dial_string: String,
    pub target_id: i64,
    pub action: IngestAction,
}

/// Get-or-create a target per dial string; finished targets are recalled
pub async fn ingest_dial_strings(
    pool: &SqlitePool,
    dial_strings: &[String],
) -> Result<Vec<IngestOutcome>> {
    let mut outcomes = Vec::with_capacity(dial_strings.len());

    for dial_string in dial_strings {
        let (target, created) = db::targets::get_or_create_target(pool, dial_string).await?;

        let action = if created {
            tracing::info!(target_id = target.id, dial_string = %dial_string, "Created target");
            IngestAction::Created
        } else if matches!(target.status, TargetStatus::New | TargetStatus::InProgress) {
            IngestAction::Unchanged
        } else {
            db::targets::recall_target(pool, target.id).await?;
            tracing::info!(
                target_id = target.id,
                previous = %target.status,
                "Target re-submitted, reset to new"
            );
            IngestAction::Reset
        };

        outcomes.push(IngestOutcome {
            dial_string: dial_string.clone(),
            target_id: target.id,
            action,
        });
    }

    Ok(outcomes)
}
