//! ivrm-explorer library interface
//!
//! Maps interactive voice menus by dialing digit sequences, transcribing the
//! recordings and scheduling the options each transcript reveals. Exposed
//! as a library for integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::services::PassContext;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Same context the scheduler runs passes with; used for on-demand
    /// digit-map rebuilds
    pub passes: PassContext,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last pass failure, shared with the scheduler
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(passes: PassContext, last_error: Arc<RwLock<Option<String>>>) -> Self {
        Self {
            db: passes.pool.clone(),
            passes,
            startup_time: Utc::now(),
            last_error,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::target_routes())
        .merge(api::queue_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
