mod common;

use axum::http::StatusCode;
use common::{body_json, build_app, get, post_user};
use idempotency_gateway::idempotency::ResponseBody;
use idempotency_gateway::store::MemoryStore;
use std::sync::Arc;
use tower::ServiceExt;

#[test]
fn test_response_body_success_serialization() {
    let body = ResponseBody::success("success", serde_json::json!({"user_id": 7}));
    let json = serde_json::to_string(&body).unwrap();
    assert_eq!(json, r#"{"success":true,"message":"success","data":{"user_id":7}}"#);
}

#[test]
fn test_response_body_failure_omits_data() {
    let body = ResponseBody::failure("Duplicate request");
    let json = serde_json::to_string(&body).unwrap();
    assert_eq!(json, r#"{"success":false,"message":"Duplicate request"}"#);
}

#[tokio::test]
async fn test_current_user_starts_at_zero() {
    let app = build_app(Arc::new(MemoryStore::new()));

    let response = app.router.clone().oneshot(get("/")).await.unwrap();
    let (status, body) = body_json(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Success");
    assert_eq!(body["data"]["current_user_id"], 0);
}

#[tokio::test]
async fn test_create_user_response_shape() {
    let app = build_app(Arc::new(MemoryStore::new()));

    let response = app
        .router
        .clone()
        .oneshot(post_user(Some(&common::unique_token()), "{}"))
        .await
        .unwrap();
    let (status, body) = body_json(response).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body,
        serde_json::json!({"success": true, "message": "success", "data": {"user_id": 1}})
    );
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_app(Arc::new(MemoryStore::new()));

    let response = app.router.clone().oneshot(get("/health")).await.unwrap();
    let (status, body) = body_json(response).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["dependencies"][0]["name"], "memory");
}

#[tokio::test]
async fn test_liveness_and_readiness() {
    let app = build_app(Arc::new(MemoryStore::new()));

    let live = app.router.clone().oneshot(get("/live")).await.unwrap();
    assert_eq!(live.status(), StatusCode::OK);

    let ready = app.router.clone().oneshot(get("/ready")).await.unwrap();
    assert_eq!(ready.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_disabled_returns_not_found() {
    let app = build_app(Arc::new(MemoryStore::new()));

    let response = app.router.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_request_id_is_generated_and_propagated() {
    let app = build_app(Arc::new(MemoryStore::new()));

    let generated = app.router.clone().oneshot(get("/")).await.unwrap();
    let id = generated.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert!(!id.is_empty());

    let request = axum::http::Request::builder()
        .uri("/")
        .header("x-request-id", "req-42")
        .body(axum::body::Body::empty())
        .unwrap();
    let echoed = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(echoed.headers()["x-request-id"].to_str().unwrap(), "req-42");
}

#[tokio::test]
async fn test_unknown_route_returns_not_found() {
    let app = build_app(Arc::new(MemoryStore::new()));

    let response = app
        .router
        .clone()
        .oneshot(get("/accounts"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
