//! Dial values: digits, digit paths and dial payloads
//!
//! These are the only shapes accepted at the boundary. Anything else is
//! rejected with `Error::InvalidInput` rather than coerced.
//!
//! Canonical JSON forms (also the uniqueness keys in the database):
//! - `DigitPath`: `["1","2"]`
//! - `DialPayload`: `[{"digit":"1","delay":5},{"digit":"2","delay":5}]`

use ivrm_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One DTMF key: `0`-`9`, `*` or `#`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digit(char);

impl Digit {
    pub fn parse(value: &str) -> Result<Self> {
        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_digit() || c == '*' || c == '#' => Ok(Digit(c)),
            _ => Err(Error::InvalidInput(format!("invalid DTMF digit '{}'", value))),
        }
    }

    pub fn as_char(&self) -> char {
        self.0
    }

    /// Numeric value for `0`-`9`, `None` for `*` and `#`
    pub fn numeric(&self) -> Option<u32> {
        self.0.to_digit(10)
    }
}

impl fmt::Display for Digit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Digit {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Digit::parse(&value)
    }
}

impl From<Digit> for String {
    fn from(digit: Digit) -> Self {
        digit.0.to_string()
    }
}

/// Ordered list of digits pressed from the root menu
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DigitPath(Vec<Digit>);

impl DigitPath {
    pub fn new(digits: Vec<Digit>) -> Self {
        Self(digits)
    }

    /// Empty path: the root menu
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a hyphen-separated path such as `1-2-*`
    ///
    /// A single digit (`"3"`) is a path of length one. Surrounding
    /// whitespace around each part is ignored.
    pub fn parse_hyphenated(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("empty digit path".to_string()));
        }
        trimmed
            .split('-')
            .map(|part| Digit::parse(part.trim()))
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    pub fn digits(&self) -> &[Digit] {
        &self.0
    }

    /// Depth in the menu tree (root = 0)
    pub fn level(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// This path extended by another
    pub fn join(&self, suffix: &DigitPath) -> DigitPath {
        let mut digits = self.0.clone();
        digits.extend_from_slice(&suffix.0);
        DigitPath(digits)
    }

    /// Human-readable label: `1-2`, or empty for the root
    pub fn label(&self) -> String {
        self.0
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("-")
    }

    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_canonical_json(value: &str) -> Result<Self> {
        serde_json::from_str(value)
            .map_err(|e| Error::InvalidInput(format!("invalid digit path '{}': {}", value, e)))
    }
}

impl fmt::Display for DigitPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.label())
        }
    }
}

/// One press: a digit and the pause (seconds) before pressing it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialStep {
    pub digit: Digit,
    pub delay: u32,
}

/// Exact list of presses for one call; empty means "just listen"
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DialPayload(Vec<DialStep>);

impl DialPayload {
    pub fn new(steps: Vec<DialStep>) -> Self {
        Self(steps)
    }

    /// Payload for the root menu (no presses)
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Every digit of `path` with the same delay
    pub fn from_path(path: &DigitPath, delay: u32) -> Self {
        Self(
            path.digits()
                .iter()
                .map(|&digit| DialStep { digit, delay })
                .collect(),
        )
    }

    pub fn steps(&self) -> &[DialStep] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Digits pressed, without delays
    pub fn path(&self) -> DigitPath {
        DigitPath::new(self.0.iter().map(|s| s.digit).collect())
    }

    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_canonical_json(value: &str) -> Result<Self> {
        serde_json::from_str(value)
            .map_err(|e| Error::InvalidInput(format!("invalid dial payload '{}': {}", value, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(label: &str) -> DigitPath {
        DigitPath::parse_hyphenated(label).unwrap()
    }

    #[test]
    fn test_digit_accepts_keypad_only() {
        for ok in ["0", "5", "9", "*", "#"] {
            assert!(Digit::parse(ok).is_ok(), "{} should parse", ok);
        }
        for bad in ["", "10", "a", " 1", "-", "1-2"] {
            assert!(Digit::parse(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_numeric_digits() {
        assert_eq!(Digit::parse("7").unwrap().numeric(), Some(7));
        assert_eq!(Digit::parse("#").unwrap().numeric(), None);
    }

    #[test]
    fn test_hyphenated_path() {
        let p = path("1-2-*");
        assert_eq!(p.level(), 3);
        assert_eq!(p.label(), "1-2-*");
        assert!(DigitPath::parse_hyphenated("1--2").is_err());
        assert!(DigitPath::parse_hyphenated("").is_err());
    }

    #[test]
    fn test_path_canonical_json() {
        assert_eq!(path("1-2").to_canonical_json().unwrap(), r#"["1","2"]"#);
        assert_eq!(DigitPath::root().to_canonical_json().unwrap(), "[]");
        assert_eq!(DigitPath::from_canonical_json(r#"["3"]"#).unwrap(), path("3"));
    }

    #[test]
    fn test_path_json_rejects_bad_digits() {
        assert!(DigitPath::from_canonical_json(r#"["12"]"#).is_err());
        assert!(DigitPath::from_canonical_json(r#"[1]"#).is_err());
    }

    #[test]
    fn test_payload_canonical_json() {
        let payload = DialPayload::from_path(&path("1"), 5);
        assert_eq!(
            payload.to_canonical_json().unwrap(),
            r#"[{"digit":"1","delay":5}]"#
        );
        assert_eq!(DialPayload::empty().to_canonical_json().unwrap(), "[]");
    }

    #[test]
    fn test_payload_path() {
        let payload = DialPayload::from_path(&path("2-#"), 3);
        assert_eq!(payload.path(), path("2-#"));
        assert_eq!(payload.steps()[1].delay, 3);
    }

    #[test]
    fn test_join() {
        assert_eq!(path("1").join(&path("2-3")), path("1-2-3"));
        assert_eq!(DigitPath::root().join(&path("4")), path("4"));
    }
}
