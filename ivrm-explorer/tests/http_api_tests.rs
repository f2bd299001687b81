//! HTTP API integration tests
//!
//! Requests go through the full router with `tower::ServiceExt::oneshot`.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceExt;

use helpers::{insert_target, TestHarness};
use ivrm_explorer::db;
use ivrm_explorer::models::{DialPayload, TargetStatus};
use ivrm_explorer::{build_router, AppState};

fn app(h: &TestHarness) -> Router {
    build_router(AppState::new(h.ctx.clone(), Arc::new(RwLock::new(None))))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_ok() {
    let h = TestHarness::new().await.unwrap();
    let (status, body) = send(app(&h), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "ivrm-explorer");
    assert!(body.get("last_error").is_none());
}

#[tokio::test]
async fn test_health_shows_last_pass_error() {
    let h = TestHarness::new().await.unwrap();
    let last_error = Arc::new(RwLock::new(Some("seed pass: database is locked".to_string())));
    let app = build_router(AppState::new(h.ctx.clone(), last_error));

    let (_, body) = send(app, get("/health")).await;
    assert_eq!(body["last_error"], "seed pass: database is locked");
}

#[tokio::test]
async fn test_ingest_creates_targets_from_text() {
    let h = TestHarness::new().await.unwrap();
    let (status, body) = send(
        app(&h),
        post_json(
            "/targets/ingest",
            json!({"text": "Main line 1-800-555-1234 or try (212) 555-0199 after hours."}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let numbers = body["numbers"].as_array().unwrap();
    assert_eq!(numbers.len(), 2);
    assert_eq!(numbers[0]["dial_string"], "18005551234");
    assert_eq!(numbers[0]["action"], "created");
    assert_eq!(numbers[1]["dial_string"], "12125550199");

    assert!(db::targets::get_target_by_dial_string(&h.pool, "12125550199")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_ingest_rejects_empty_text() {
    let h = TestHarness::new().await.unwrap();
    let (status, body) = send(app(&h), post_json("/targets/ingest", json!({"text": "   "}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_ingest_resets_finished_target() {
    let h = TestHarness::new().await.unwrap();
    let target = insert_target(&h.pool, "18005551234").await.unwrap();
    db::targets::transition_status(&h.pool, target.id, TargetStatus::New, TargetStatus::InProgress)
        .await
        .unwrap();
    db::targets::transition_status(
        &h.pool,
        target.id,
        TargetStatus::InProgress,
        TargetStatus::Failed,
    )
    .await
    .unwrap();

    let (_, body) = send(
        app(&h),
        post_json("/targets/ingest", json!({"text": "1 800 555 1234"})),
    )
    .await;
    assert_eq!(body["numbers"][0]["action"], "reset");

    let target = db::targets::get_target(&h.pool, target.id).await.unwrap().unwrap();
    assert_eq!(target.status, TargetStatus::New);
}

#[tokio::test]
async fn test_list_and_detail() {
    let h = TestHarness::new().await.unwrap();
    let target = insert_target(&h.pool, "18005551234").await.unwrap();
    let payload = DialPayload::empty();
    db::call_records::insert_record(&h.pool, target.id, "rec-1.wav", &payload, Some(9.0))
        .await
        .unwrap();

    let (status, body) = send(app(&h), get("/targets")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["dial_string"], "18005551234");
    assert_eq!(body[0]["call_count"], 1);

    let (status, body) = send(app(&h), get(&format!("/targets/{}", target.id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["target"]["status"], "new");
    assert_eq!(body["call_records"].as_array().unwrap().len(), 1);
    assert!(body["sequences"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_target_is_not_found() {
    let h = TestHarness::new().await.unwrap();
    let (status, body) = send(app(&h), get("/targets/4242")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = send(app(&h), post_json("/targets/4242/recall", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_change_rules() {
    let h = TestHarness::new().await.unwrap();
    let target = insert_target(&h.pool, "18005551234").await.unwrap();
    let uri = format!("/targets/{}/status", target.id);

    // Not started yet
    let (status, _) = send(app(&h), post_json(&uri, json!({"status": "completed"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    db::targets::transition_status(&h.pool, target.id, TargetStatus::New, TargetStatus::InProgress)
        .await
        .unwrap();

    let (status, _) = send(app(&h), post_json(&uri, json!({"status": "new"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(app(&h), post_json(&uri, json!({"status": "completed"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    let (status, body) = send(
        app(&h),
        post_json(&format!("/targets/{}/recall", target.id), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "new");
}

#[tokio::test]
async fn test_manual_sequence_added_once() {
    let h = TestHarness::new().await.unwrap();
    let target = insert_target(&h.pool, "18005551234").await.unwrap();
    let uri = format!("/targets/{}/sequences", target.id);

    let (status, body) = send(
        app(&h),
        post_json(&uri, json!({"digits": "1-2", "description": "billing"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], true);
    assert_eq!(body["digits"], json!(["1", "2"]));

    let (_, body) = send(app(&h), post_json(&uri, json!({"digits": "1-2"}))).await;
    assert_eq!(body["created"], false);

    let (status, _) = send(app(&h), post_json(&uri, json!({"digits": "1-x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let sequences = db::sequences::list_for_target(&h.pool, target.id).await.unwrap();
    assert_eq!(sequences.len(), 1);
    assert!(!sequences[0].explored);
}

#[tokio::test]
async fn test_refresh_rebuilds_digit_map() {
    let h = TestHarness::new().await.unwrap();
    let target = insert_target(&h.pool, "18005551234").await.unwrap();
    let summary = "Press 1 for sales.";
    db::targets::set_summary(&h.pool, target.id, summary, ivrm_common::time::now())
        .await
        .unwrap();
    h.analyzer
        .set_options(summary, r#"[{"digit":"1","action":"sales"}]"#);

    let (status, body) = send(
        app(&h),
        post_json(&format!("/targets/{}/refresh", target.id), json!({})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["1"]["action"], "sales");
    assert_eq!(body["1"]["source"], "summary");
}

#[tokio::test]
async fn test_queue_count() {
    let h = TestHarness::new().await.unwrap();
    let first = insert_target(&h.pool, "18005551234").await.unwrap();
    insert_target(&h.pool, "18005550000").await.unwrap();
    h.ctx.queue.enqueue(first.id, &DialPayload::empty()).await.unwrap();

    let (status, body) = send(app(&h), get("/queue/count")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"pending": 1, "processing": 0, "new_targets": 2}));
}
