//! Services for ivrm-explorer
//!
//! External clients, the queue manager, the exploration engine, the
//! reconciliation passes and their scheduler.

pub mod call_executor_client;
pub mod exploration;
pub mod menu_analysis_client;
pub mod number_extractor;
pub mod queue_manager;
pub mod recording_store;
pub mod reconciliation;
pub mod scheduler;

pub use call_executor_client::{CallExecutor, CallExecutorError, CallOutcome, HttpCallExecutor};
pub use exploration::{merge_digit_map, parse_menu_options, plan_candidates, ExplorationEngine};
pub use menu_analysis_client::{AnalysisError, HttpMenuAnalyzer, MenuAnalyzer};
pub use number_extractor::{extract_dial_strings, ingest_dial_strings, IngestAction, IngestOutcome};
pub use queue_manager::{QueueManager, ReclaimSummary};
pub use recording_store::RecordingStore;
pub use reconciliation::PassContext;
pub use scheduler::Scheduler;
