//! HTTP API handlers for ivrm-explorer
//!
//! Operator surface only: health, target ingestion and control, queue
//! counts. Responses are JSON.

pub mod health;
pub mod queue;
pub mod targets;

pub use health::health_routes;
pub use queue::queue_routes;
pub use targets::target_routes;
