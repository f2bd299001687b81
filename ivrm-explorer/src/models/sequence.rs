//! Sequence: a known path in a target's menu tree

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DigitPath;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub id: i64,
    pub target_id: i64,
    pub digits: DigitPath,
    pub description: String,
    /// Always `digits.level()`
    pub level: i64,
    /// Pressing this path leads to another menu
    pub is_submenu: bool,
    /// A call for this path has been scheduled
    pub explored: bool,
    pub created_at: DateTime<Utc>,
}

/// A path proposed by option extraction, not yet stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceCandidate {
    pub digits: DigitPath,
    pub description: String,
    pub is_submenu: bool,
}
