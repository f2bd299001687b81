//! Queue status endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::db;
use crate::error::ApiResult;
use crate::models::TargetStatus;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct QueueCountResponse {
    /// Items waiting to be dialed
    pub pending: i64,
    /// Items currently being dialed
    pub processing: i64,
    /// Targets waiting for the seed pass
    pub new_targets: i64,
}

/// GET /queue/count
pub async fn queue_count(State(state): State<AppState>) -> ApiResult<Json<QueueCountResponse>> {
    Ok(Json(QueueCountResponse {
        pending: db::queue::count_pending(&state.db).await?,
        processing: db::queue::count_processing(&state.db).await?,
        new_targets: db::targets::count_by_status(&state.db, TargetStatus::New).await?,
    }))
}

pub fn queue_routes() -> Router<AppState> {
    Router::new().route("/queue/count", get(queue_count))
}
