//! Call attempt record: the outcome of one placed call

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DialPayload;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAttemptRecord {
    pub id: i64,
    pub target_id: i64,
    /// Identifier returned by the call executor
    pub recording_id: String,
    /// Exactly what was dialed
    pub payload: DialPayload,
    pub transcript: Option<String>,
    pub duration_secs: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl CallAttemptRecord {
    /// Transcript present and at least `min_len` characters after trimming
    pub fn has_usable_transcript(&self, min_len: usize) -> bool {
        self.transcript
            .as_deref()
            .map(|t| t.trim().chars().count() >= min_len)
            .unwrap_or(false)
    }
}
