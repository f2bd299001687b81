//! Exploration engine
//!
//! Turns analysis output into new menu paths:
//! 1. normalize the raw option-extraction response ([`parse_menu_options`])
//! 2. anchor options in the tree and drop known paths ([`plan_candidates`])
//! 3. store survivors and schedule a call for each
//!
//! The only dedup key is the full digit path per target.

use regex::Regex;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use ivrm_common::Result;

use crate::db;
use crate::models::{
    DialPayload, Digit, DigitMap, DigitMapEntry, DigitPath, MenuOption, OptionSource,
    SequenceCandidate,
};
use crate::services::menu_analysis_client::MenuAnalyzer;
use crate::services::queue_manager::QueueManager;

/// Context sent with root-menu text
pub const ROOT_CONTEXT: &str = "no previous keys pressed";

fn bracketed_array() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[(.*)\]").expect("Failed to compile regex"))
}

/// Human context for the analysis service: `1->2`, or [`ROOT_CONTEXT`]
pub fn menu_context(path: &DigitPath) -> String {
    if path.is_root() {
        ROOT_CONTEXT.to_string()
    } else {
        path.digits()
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("->")
    }
}

/// Normalize a raw option-extraction response
///
/// Accepts a JSON array of options or an object with an `options` array,
/// optionally wrapped in markdown code fences or surrounded by prose.
/// Each option needs a `digit` (string or integer; `"1-2"` is a two-press
/// path); `action` and `submenu` are optional. Options with invalid digits
/// are skipped. Anything unstructured yields no options.
pub fn parse_menu_options(raw: &str) -> Vec<MenuOption> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();

    let value = match serde_json::from_str::<Value>(cleaned) {
        Ok(value) => value,
        Err(_) => {
            let embedded = bracketed_array()
                .captures(cleaned)
                .and_then(|caps| caps.get(1))
                .and_then(|inner| {
                    serde_json::from_str::<Value>(&format!("[{}]", inner.as_str())).ok()
                });
            match embedded {
                Some(value) => value,
                None => {
                    tracing::warn!(
                        response = %truncate(cleaned, 200),
                        "Option extraction returned unstructured text"
                    );
                    return Vec::new();
                }
            }
        }
    };

    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut object) => match object.remove("options") {
            Some(Value::Array(entries)) => entries,
            _ => {
                tracing::warn!("Option extraction returned an object without an options array");
                return Vec::new();
            }
        },
        _ => return Vec::new(),
    };

    entries.iter().filter_map(parse_option_entry).collect()
}

fn parse_option_entry(entry: &Value) -> Option<MenuOption> {
    let object = entry.as_object()?;

    let digits = match object.get("digit") {
        Some(Value::String(s)) => DigitPath::parse_hyphenated(s),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(n) if n <= 9 => Digit::parse(&n.to_string()).map(|d| DigitPath::new(vec![d])),
            _ => Err(ivrm_common::Error::InvalidInput(format!("digit {}", n))),
        },
        other => Err(ivrm_common::Error::InvalidInput(format!("digit {:?}", other))),
    };

    let digits = match digits {
        Ok(digits) => digits,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping menu option with invalid digit");
            return None;
        }
    };

    let action = object
        .get("action")
        .or_else(|| object.get("description"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    let submenu = object
        .get("submenu")
        .or_else(|| object.get("is_submenu"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Some(MenuOption {
        digits,
        action,
        submenu,
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Anchor options in the tree and keep the genuinely new paths
///
/// Submenu options go under every known submenu path (root if there is
/// none); other options go at the root. Paths already in `existing`,
/// repeated within the batch, or deeper than `max_depth` are dropped.
pub fn plan_candidates(
    options: &[MenuOption],
    existing: &HashSet<DigitPath>,
    submenu_parents: &[DigitPath],
    max_depth: usize,
) -> Vec<SequenceCandidate> {
    let mut seen: HashSet<DigitPath> = HashSet::new();
    let mut candidates = Vec::new();

    for option in options {
        let anchored: Vec<DigitPath> = if option.submenu && !submenu_parents.is_empty() {
            submenu_parents
                .iter()
                .map(|parent| parent.join(&option.digits))
                .collect()
        } else {
            vec![option.digits.clone()]
        };

        for digits in anchored {
            if digits.level() > max_depth {
                tracing::debug!(path = %digits, max_depth, "Skipping path beyond max depth");
                continue;
            }
            if existing.contains(&digits) || !seen.insert(digits.clone()) {
                continue;
            }
            candidates.push(SequenceCandidate {
                digits,
                description: option.action.clone(),
                is_submenu: option.submenu,
            });
        }
    }

    candidates
}

/// Merge options into a digit map; summary entries win over transcript
/// entries for the same digit, and within one source the first wins
pub fn merge_digit_map(
    summary_options: &[MenuOption],
    transcript_options: &[MenuOption],
) -> DigitMap {
    let mut ranked: Vec<(OptionSource, &MenuOption)> = summary_options
        .iter()
        .map(|o| (OptionSource::Summary, o))
        .chain(transcript_options.iter().map(|o| (OptionSource::Transcript, o)))
        .collect();
    // Stable: keeps the original order inside each source
    ranked.sort_by_key(|(source, _)| source.precedence());

    let mut map = DigitMap::default();
    for (source, option) in ranked {
        map.0
            .entry(option.digits.label())
            .or_insert_with(|| DigitMapEntry {
                action: option.action.clone(),
                submenu: option.submenu,
                source,
            });
    }
    map
}

/// Extraction + dedup + scheduling
#[derive(Clone)]
pub struct ExplorationEngine {
    pool: SqlitePool,
    analyzer: Arc<dyn MenuAnalyzer>,
    queue: QueueManager,
    dial_delay_secs: u32,
    max_depth: usize,
}

impl ExplorationEngine {
    pub fn new(
        pool: SqlitePool,
        analyzer: Arc<dyn MenuAnalyzer>,
        queue: QueueManager,
        dial_delay_secs: u32,
        max_depth: usize,
    ) -> Self {
        Self {
            pool,
            analyzer,
            queue,
            dial_delay_secs,
            max_depth,
        }
    }

    pub fn dial_delay_secs(&self) -> u32 {
        self.dial_delay_secs
    }

    /// Ask the analysis service for options in `text`
    ///
    /// Service failures are logged and treated as "no options".
    pub async fn fetch_options(
        &self,
        text: &str,
        context: &DigitPath,
        source: OptionSource,
    ) -> Vec<MenuOption> {
        let context = menu_context(context);
        match self.analyzer.extract_options(text, &context, source).await {
            Ok(raw) => parse_menu_options(&raw),
            Err(e) => {
                tracing::warn!(error = %e, context = %context, "Option extraction failed");
                Vec::new()
            }
        }
    }

    /// Find, store and schedule the new paths announced in `text`
    ///
    /// Returns the candidates this call created. Stored sequences are marked
    /// explored because a call is scheduled for each of them here.
    pub async fn extract_new_sequences(
        &self,
        target_id: i64,
        text: &str,
        context: &DigitPath,
        source: OptionSource,
    ) -> Result<Vec<SequenceCandidate>> {
        let options = self.fetch_options(text, context, source).await;
        if options.is_empty() {
            tracing::debug!(target_id, context = %context, "No menu options found");
            return Ok(Vec::new());
        }

        let existing = db::sequences::existing_paths(&self.pool, target_id).await?;
        let parents = db::sequences::submenu_paths(&self.pool, target_id).await?;
        let candidates = plan_candidates(&options, &existing, &parents, self.max_depth);

        let mut created = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let inserted = db::sequences::insert_if_absent(
                &self.pool,
                target_id,
                &candidate.digits,
                &candidate.description,
                candidate.is_submenu,
                true,
            )
            .await?;
            // Another worker stored the same path first; it schedules the call
            if !inserted {
                continue;
            }

            let payload = DialPayload::from_path(&candidate.digits, self.dial_delay_secs);
            self.queue.enqueue(target_id, &payload).await?;
            created.push(candidate);
        }

        if !created.is_empty() {
            tracing::info!(
                target_id,
                context = %context,
                new_paths = created.len(),
                "Discovered new menu paths"
            );
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(label: &str) -> DigitPath {
        DigitPath::parse_hyphenated(label).unwrap()
    }

    fn option(label: &str, submenu: bool) -> MenuOption {
        MenuOption {
            digits: path(label),
            action: format!("action {}", label),
            submenu,
        }
    }

    #[test]
    fn test_parse_plain_array() {
        let options = parse_menu_options(
            r#"[{"digit":"1","action":"sales","submenu":false},{"digit":"2","action":"support","submenu":true}]"#,
        );
        assert_eq!(options.len(), 2);
        assert_eq!(options[1].digits, path("2"));
        assert!(options[1].submenu);
    }

    #[test]
    fn test_parse_fenced_and_integer_digits() {
        let raw = "```json\n[{\"digit\": 3, \"action\": \"billing\"}]\n```";
        let options = parse_menu_options(raw);
        assert_eq!(options, vec![MenuOption {
            digits: path("3"),
            action: "billing".to_string(),
            submenu: false,
        }]);
    }

    #[test]
    fn test_parse_options_object_and_hyphenated_digit() {
        let options = parse_menu_options(r#"{"options":[{"digit":"1-2","action":"book"}]}"#);
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].digits, path("1-2"));
    }

    #[test]
    fn test_parse_array_embedded_in_prose() {
        let raw = "Here are the options: [{\"digit\":\"0\",\"action\":\"operator\"}] hope that helps";
        assert_eq!(parse_menu_options(raw).len(), 1);
    }

    #[test]
    fn test_parse_drops_invalid_digits() {
        let raw = r##"[{"digit":"12","action":"x"},{"digit":"a"},{"digit":10},{"action":"no digit"},{"digit":"#","action":"back"}]"##;
        let options = parse_menu_options(raw);
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].digits, path("#"));
    }

    #[test]
    fn test_parse_unstructured_yields_nothing() {
        assert!(parse_menu_options("Press 1 for sales").is_empty());
        assert!(parse_menu_options("").is_empty());
        assert!(parse_menu_options("42").is_empty());
        assert!(parse_menu_options(r#"{"result":"none"}"#).is_empty());
    }

    #[test]
    fn test_plan_dedups_against_existing() {
        let existing: HashSet<DigitPath> = [path("1")].into_iter().collect();
        let candidates = plan_candidates(
            &[option("1", false), option("2", false)],
            &existing,
            &[],
            6,
        );
        let paths: Vec<DigitPath> = candidates.into_iter().map(|c| c.digits).collect();
        assert_eq!(paths, vec![path("2")]);
    }

    #[test]
    fn test_plan_anchors_submenus_under_every_parent() {
        let existing: HashSet<DigitPath> = [path("1"), path("2")].into_iter().collect();
        let parents = vec![path("1"), path("2")];
        let options = [option("3", true), option("9", false)];
        let candidates = plan_candidates(&options, &existing, &parents, 6);
        let paths: Vec<DigitPath> = candidates.into_iter().map(|c| c.digits).collect();
        assert_eq!(paths, vec![path("1-3"), path("2-3"), path("9")]);
    }

    #[test]
    fn test_plan_submenu_without_parent_goes_to_root() {
        let candidates = plan_candidates(&[option("4", true)], &HashSet::new(), &[], 6);
        assert_eq!(candidates[0].digits, path("4"));
        assert!(candidates[0].is_submenu);
    }

    #[test]
    fn test_plan_dedups_within_batch_and_respects_depth() {
        let candidates = plan_candidates(
            &[option("5", false), option("5", false), option("1-2-3", false)],
            &HashSet::new(),
            &[],
            2,
        );
        let paths: Vec<DigitPath> = candidates.into_iter().map(|c| c.digits).collect();
        assert_eq!(paths, vec![path("5")]);
    }

    #[test]
    fn test_merge_prefers_summary() {
        let summary = vec![MenuOption {
            digits: path("1"),
            action: "sales (summary)".to_string(),
            submenu: false,
        }];
        let transcript = vec![
            MenuOption {
                digits: path("1"),
                action: "sales (transcript)".to_string(),
                submenu: true,
            },
            option("2", false),
        ];

        let map = merge_digit_map(&summary, &transcript);
        assert_eq!(map.len(), 2);
        let one = map.get("1").unwrap();
        assert_eq!(one.source, OptionSource::Summary);
        assert_eq!(one.action, "sales (summary)");
        assert_eq!(map.get("2").unwrap().source, OptionSource::Transcript);
    }

    #[test]
    fn test_merge_first_transcript_wins() {
        let transcript = vec![
            MenuOption {
                digits: path("7"),
                action: "first".to_string(),
                submenu: false,
            },
            MenuOption {
                digits: path("7"),
                action: "second".to_string(),
                submenu: false,
            },
        ];
        let map = merge_digit_map(&[], &transcript);
        assert_eq!(map.get("7").unwrap().action, "first");
    }

    #[test]
    fn test_menu_context() {
        assert_eq!(menu_context(&DigitPath::root()), ROOT_CONTEXT);
        assert_eq!(menu_context(&path("1-2")), "1->2");
    }
}
