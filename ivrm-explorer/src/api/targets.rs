//! Target endpoints
//!
//! GET /targets, GET /targets/:id, POST /targets/ingest,
//! POST /targets/:id/recall, POST /targets/:id/status,
//! POST /targets/:id/refresh, POST /targets/:id/sequences

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    CallAttemptRecord, DigitMap, DigitPath, QueueItem, Sequence, Target, TargetStatus,
};
use crate::services::number_extractor::{extract_dial_strings, ingest_dial_strings, IngestOutcome};
use crate::services::reconciliation::rebuild_digit_map;
use crate::AppState;

const RECENT_TARGETS_LIMIT: i64 = 50;

#[derive(Debug, Serialize)]
pub struct TargetSummary {
    #[serde(flatten)]
    pub target: Target,
    pub call_count: i64,
}

#[derive(Debug, Serialize)]
pub struct TargetDetail {
    pub target: Target,
    pub sequences: Vec<Sequence>,
    pub call_records: Vec<CallAttemptRecord>,
    pub queue_items: Vec<QueueItem>,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub numbers: Vec<IngestOutcome>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: TargetStatus,
}

#[derive(Debug, Deserialize)]
pub struct AddSequenceRequest {
    /// Hyphen-separated path, e.g. `1-2`
    pub digits: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub submenu: bool,
}

#[derive(Debug, Serialize)]
pub struct AddSequenceResponse {
    pub digits: DigitPath,
    pub created: bool,
}

async fn load_target(state: &AppState, id: i64) -> ApiResult<Target> {
    db::targets::get_target(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("target {}", id)))
}

/// GET /targets
pub async fn list_targets(State(state): State<AppState>) -> ApiResult<Json<Vec<TargetSummary>>> {
    let targets = db::targets::list_recent(&state.db, RECENT_TARGETS_LIMIT).await?;
    let mut summaries = Vec::with_capacity(targets.len());
    for target in targets {
        let call_count = db::call_records::count_for_target(&state.db, target.id).await?;
        summaries.push(TargetSummary { target, call_count });
    }
    Ok(Json(summaries))
}

/// GET /targets/:id
pub async fn get_target(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<TargetDetail>> {
    let target = load_target(&state, id).await?;
    let sequences = db::sequences::list_for_target(&state.db, id).await?;
    let call_records = db::call_records::list_for_target(&state.db, id).await?;
    let queue_items = db::queue::list_for_target(&state.db, id).await?;

    Ok(Json(TargetDetail {
        target,
        sequences,
        call_records,
        queue_items,
    }))
}

/// POST /targets/ingest
///
/// Extract phone numbers from free text and create (or recall) targets.
pub async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<Json<IngestResponse>> {
    if request.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".to_string()));
    }

    let dial_strings = extract_dial_strings(&request.text);
    tracing::info!(found = dial_strings.len(), "Ingesting phone numbers");

    let numbers = ingest_dial_strings(&state.db, &dial_strings).await?;
    Ok(Json(IngestResponse { numbers }))
}

/// POST /targets/:id/recall
pub async fn recall(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Target>> {
    let target = db::targets::recall_target(&state.db, id).await?;
    tracing::info!(target_id = id, "Target recalled");
    Ok(Json(target))
}

/// POST /targets/:id/status
///
/// Operators may finish an in-progress target as completed or failed.
pub async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<Json<Target>> {
    if !request.status.is_terminal() {
        return Err(ApiError::BadRequest(format!(
            "status must be completed or failed, got {}",
            request.status
        )));
    }

    let target = load_target(&state, id).await?;
    if target.status != TargetStatus::InProgress {
        return Err(ApiError::Conflict(format!(
            "target {} is {}, only in_progress targets can be finished",
            id, target.status
        )));
    }

    if !db::targets::transition_status(&state.db, id, TargetStatus::InProgress, request.status)
        .await?
    {
        return Err(ApiError::Conflict(format!("target {} changed status concurrently", id)));
    }

    tracing::info!(target_id = id, status = %request.status, "Target status set by operator");
    load_target(&state, id).await.map(Json)
}

/// POST /targets/:id/refresh
///
/// Rebuild the digit map now. Runs the analysis calls inline.
pub async fn refresh(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<DigitMap>> {
    load_target(&state, id).await?;
    let map = rebuild_digit_map(&state.passes, id).await?;
    Ok(Json(map))
}

/// POST /targets/:id/sequences
///
/// Add a path by hand; the tree-seeding pass schedules its call.
pub async fn add_sequence(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<AddSequenceRequest>,
) -> ApiResult<Json<AddSequenceResponse>> {
    let digits = DigitPath::parse_hyphenated(&request.digits)?;
    load_target(&state, id).await?;

    let created = db::sequences::insert_if_absent(
        &state.db,
        id,
        &digits,
        request.description.trim(),
        request.submenu,
        false,
    )
    .await?;

    Ok(Json(AddSequenceResponse { digits, created }))
}

pub fn target_routes() -> Router<AppState> {
    Router::new()
        .route("/targets", get(list_targets))
        .route("/targets/ingest", post(ingest))
        .route("/targets/:id", get(get_target))
        .route("/targets/:id/recall", post(recall))
        .route("/targets/:id/status", post(set_status))
        .route("/targets/:id/refresh", post(refresh))
        .route("/targets/:id/sequences", post(add_sequence))
}
