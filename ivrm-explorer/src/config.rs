//! Configuration for ivrm-explorer
//!
//! Built once at startup and passed to every component.
//!
//! # Configuration Priority
//!
//! 1. Command-line arguments (highest priority)
//! 2. Environment variables (`IVRM_ROOT_FOLDER`, `IVRM_ANALYSIS_TOKEN`, ...)
//! 3. TOML configuration file
//! 4. Built-in defaults (lowest priority)

use ivrm_common::config::{load_toml_or_default, LoggingConfig};
use ivrm_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable holding the analysis service bearer token
pub const ANALYSIS_TOKEN_ENV: &str = "IVRM_ANALYSIS_TOKEN";

/// Module name used for the TOML file and health reports
pub const MODULE_NAME: &str = "ivrm-explorer";

/// Time past the executor timeout a dispatch worker may still spend storing
/// the call record before its claim can be reclaimed
pub const CLAIM_TIMEOUT_MARGIN_SECS: u64 = 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Folder holding `ivrm.db` and the recordings directories
    pub root_folder: Option<PathBuf>,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub executor: ExecutorConfig,
    pub analysis: AnalysisConfig,
    pub recordings: RecordingsConfig,
    pub exploration: ExplorationConfig,
    pub recovery: RecoveryConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5740,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    /// SQLite busy timeout per statement
    pub busy_timeout_ms: u64,
    /// Total time `retry_on_lock` keeps retrying a locked operation
    pub max_lock_wait_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            busy_timeout_ms: 5000,
            max_lock_wait_ms: 5000,
        }
    }
}

/// Call executor service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Menu analysis (transcription + option extraction) service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub api_token: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8001".to_string(),
            timeout_secs: 60,
            api_token: None,
        }
    }
}

/// Where the executor drops recordings and where they are staged for
/// transcription. Relative paths are resolved against the root folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingsConfig {
    pub source_dir: PathBuf,
    pub serve_dir: PathBuf,
}

impl Default for RecordingsConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("recordings/incoming"),
            serve_dir: PathBuf::from("recordings/served"),
        }
    }
}

impl RecordingsConfig {
    pub fn resolve(&self, root: &Path) -> RecordingsConfig {
        RecordingsConfig {
            source_dir: root.join(&self.source_dir),
            serve_dir: root.join(&self.serve_dir),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationConfig {
    /// Pause before each digit press (seconds)
    pub dial_delay_secs: u32,
    /// Deepest path ever scheduled
    pub max_depth: usize,
    /// Unexplored sequences seeded per tree-seeding pass
    pub tree_seed_batch: i64,
    /// Records transcribed per backfill pass
    pub backfill_batch: i64,
    /// Transcriptions in flight at once within a backfill pass
    pub backfill_concurrency: usize,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            dial_delay_secs: 5,
            max_depth: 6,
            tree_seed_batch: 5,
            backfill_batch: 10,
            backfill_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Age after which an untranscribed or too-short record is redone
    pub stalled_after_secs: u64,
    pub min_transcript_len: i64,
    /// Age after which a `processing` item is considered abandoned
    pub claim_timeout_secs: u64,
    pub max_attempts: i64,
    /// Quiescent convergence passes before a target is finalized
    pub converge_after_cycles: i64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            stalled_after_secs: 20 * 60,
            min_transcript_len: 20,
            claim_timeout_secs: 10 * 60,
            max_attempts: 3,
            converge_after_cycles: 3,
        }
    }
}

/// Pass intervals in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub dispatch_secs: u64,
    pub dispatch_workers: usize,
    pub seed_secs: u64,
    pub backfill_secs: u64,
    pub tree_seed_secs: u64,
    pub stalled_secs: u64,
    pub digit_map_secs: u64,
    pub summary_secs: u64,
    pub convergence_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            dispatch_secs: 10,
            dispatch_workers: 2,
            seed_secs: 120,
            backfill_secs: 120,
            tree_seed_secs: 300,
            stalled_secs: 900,
            digit_map_secs: 360,
            summary_secs: 1200,
            convergence_secs: 300,
        }
    }
}

impl ExplorerConfig {
    /// Load from a TOML file (missing file → defaults) and apply
    /// environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: ExplorerConfig = load_toml_or_default(path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(ANALYSIS_TOKEN_ENV) {
            if !token.trim().is_empty() {
                if self.analysis.api_token.is_some() {
                    warn!(
                        "Analysis token found in both {} and TOML. Using environment.",
                        ANALYSIS_TOKEN_ENV
                    );
                } else {
                    info!("Analysis token loaded from environment variable");
                }
                self.analysis.api_token = Some(token);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.schedule.dispatch_workers == 0 {
            return Err(Error::Config("schedule.dispatch_workers must be at least 1".into()));
        }
        let intervals = [
            ("dispatch_secs", self.schedule.dispatch_secs),
            ("seed_secs", self.schedule.seed_secs),
            ("backfill_secs", self.schedule.backfill_secs),
            ("tree_seed_secs", self.schedule.tree_seed_secs),
            ("stalled_secs", self.schedule.stalled_secs),
            ("digit_map_secs", self.schedule.digit_map_secs),
            ("summary_secs", self.schedule.summary_secs),
            ("convergence_secs", self.schedule.convergence_secs),
        ];
        for (name, secs) in intervals {
            if secs == 0 {
                return Err(Error::Config(format!("schedule.{} must be positive", name)));
            }
        }
        if self.exploration.max_depth == 0 {
            return Err(Error::Config("exploration.max_depth must be at least 1".into()));
        }
        if self.exploration.backfill_concurrency == 0 {
            return Err(Error::Config(
                "exploration.backfill_concurrency must be at least 1".into(),
            ));
        }
        // A claim must outlive the call it covers, or a second worker re-dials
        let min_claim = self.executor.timeout_secs.saturating_add(CLAIM_TIMEOUT_MARGIN_SECS);
        if self.recovery.claim_timeout_secs < min_claim {
            return Err(Error::Config(format!(
                "recovery.claim_timeout_secs ({}) must be at least executor.timeout_secs + {} ({})",
                self.recovery.claim_timeout_secs, CLAIM_TIMEOUT_MARGIN_SECS, min_claim
            )));
        }
        if self.recovery.max_attempts < 1 {
            return Err(Error::Config("recovery.max_attempts must be at least 1".into()));
        }
        if self.recovery.converge_after_cycles < 1 {
            return Err(Error::Config(
                "recovery.converge_after_cycles must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl RecoveryConfig {
    pub fn stalled_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stalled_after_secs as i64)
    }

    pub fn claim_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.claim_timeout_secs as i64)
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AnalysisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ExplorerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.exploration.dial_delay_secs, 5);
        assert_eq!(config.recovery.min_transcript_len, 20);
        assert_eq!(config.recovery.stalled_after(), chrono::Duration::minutes(20));
        assert_eq!(config.schedule.dispatch_secs, 10);
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config: ExplorerConfig = toml::from_str(
            r#"
            [executor]
            base_url = "http://caller.internal:9000"

            [schedule]
            dispatch_workers = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.executor.base_url, "http://caller.internal:9000");
        assert_eq!(config.executor.timeout_secs, 30);
        assert_eq!(config.schedule.dispatch_workers, 4);
        assert_eq!(config.schedule.summary_secs, 1200);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = ExplorerConfig::default();
        config.schedule.dispatch_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_claim_timeout_must_outlive_call() {
        let mut config = ExplorerConfig::default();
        config.executor.timeout_secs = 60;
        config.recovery.claim_timeout_secs = 10;
        assert!(config.validate().is_err());

        config.recovery.claim_timeout_secs = 60 + CLAIM_TIMEOUT_MARGIN_SECS - 1;
        assert!(config.validate().is_err());

        config.recovery.claim_timeout_secs = 60 + CLAIM_TIMEOUT_MARGIN_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_recordings_resolve_against_root() {
        let resolved = RecordingsConfig::default().resolve(Path::new("/srv/ivrm"));
        assert_eq!(resolved.source_dir, PathBuf::from("/srv/ivrm/recordings/incoming"));

        let absolute = RecordingsConfig {
            source_dir: PathBuf::from("/mnt/calls"),
            serve_dir: PathBuf::from("served"),
        }
        .resolve(Path::new("/srv/ivrm"));
        assert_eq!(absolute.source_dir, PathBuf::from("/mnt/calls"));
    }
}
