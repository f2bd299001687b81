//! Database access for ivrm-explorer
//!
//! One module per table. Functions that may run inside a caller's
//! transaction take any sqlx executor; the rest take the pool.

pub mod call_records;
pub mod queue;
pub mod sequences;
pub mod targets;
