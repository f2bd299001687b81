//! Target: one phone number being mapped
//!
//! Status machine: `new → in_progress → {completed, failed}`. Recall resets
//! any status back to `new`.

use chrono::{DateTime, Utc};
use ivrm_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::DigitMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    /// Waiting for the seed pass
    New,
    /// Seeded; calls are being placed and analyzed
    InProgress,
    /// Converged with at least one transcript
    Completed,
    /// Converged without usable results, or marked failed by an operator
    Failed,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::New => "new",
            TargetStatus::InProgress => "in_progress",
            TargetStatus::Completed => "completed",
            TargetStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TargetStatus::Completed | TargetStatus::Failed)
    }

    /// Forward transitions only; recall is handled separately
    pub fn can_transition_to(&self, next: TargetStatus) -> bool {
        matches!(
            (self, next),
            (TargetStatus::New, TargetStatus::InProgress)
                | (TargetStatus::InProgress, TargetStatus::Completed)
                | (TargetStatus::InProgress, TargetStatus::Failed)
        )
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "new" => Ok(TargetStatus::New),
            "in_progress" => Ok(TargetStatus::InProgress),
            "completed" => Ok(TargetStatus::Completed),
            "failed" => Ok(TargetStatus::Failed),
            other => Err(Error::InvalidInput(format!("unknown target status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: i64,
    /// Normalized phone number (digits only, country code included)
    pub dial_string: String,
    pub status: TargetStatus,
    pub summary: Option<String>,
    pub summary_updated_at: Option<DateTime<Utc>>,
    pub digit_map: Option<DigitMap>,
    /// Most recent dial failure
    pub last_error: Option<String>,
    /// Consecutive convergence passes that found the target quiescent
    pub idle_cycles: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use TargetStatus::*;
        assert!(New.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Failed));

        assert!(!New.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Failed.can_transition_to(New));
        assert!(!InProgress.can_transition_to(New));
    }

    #[test]
    fn test_status_round_trip_through_str() {
        for status in [
            TargetStatus::New,
            TargetStatus::InProgress,
            TargetStatus::Completed,
            TargetStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<TargetStatus>().unwrap(), status);
        }
        assert!("dialing".parse::<TargetStatus>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&TargetStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
    }
}
