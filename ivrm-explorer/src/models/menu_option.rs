//! Menu options extracted from transcripts and summaries

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::DigitPath;

/// Where an option was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionSource {
    Summary,
    Transcript,
}

impl OptionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionSource::Summary => "summary",
            OptionSource::Transcript => "transcript",
        }
    }

    /// Lower wins when two sources describe the same digit
    pub fn precedence(&self) -> u8 {
        match self {
            OptionSource::Summary => 0,
            OptionSource::Transcript => 1,
        }
    }
}

/// One option as announced by the menu, relative to the menu it was heard in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuOption {
    /// Usually one digit; multi-press options (`1-2`) carry several
    pub digits: DigitPath,
    pub action: String,
    pub submenu: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitMapEntry {
    pub action: String,
    pub submenu: bool,
    pub source: OptionSource,
}

/// Digit label (`"1"`, `"1-2"`) → option, stored as a JSON object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DigitMap(pub BTreeMap<String, DigitMapEntry>);

impl DigitMap {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<&DigitMapEntry> {
        self.0.get(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DigitMapEntry)> {
        self.0.iter()
    }
}
