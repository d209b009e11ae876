use axum::{
    extract::{MatchedPath, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::api::responses::{CreatedUserData, CurrentUserData, HealthResponse};
use crate::idempotency::ResponseBody;
use crate::observability::{get_metrics, LatencyTimer};

use super::routes::AppState;

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let health = state.health_checker.check_all().await;
    let status = if health.status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status, Json(HealthResponse::from(health)))
}

/// Readiness check endpoint.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    if state.health_checker.is_ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness check endpoint.
pub async fn liveness_check(State(state): State<AppState>) -> StatusCode {
    if state.health_checker.is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Prometheus scrape endpoint; 404 when metrics are disabled.
pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// ============================================================================
// User Handlers
// ============================================================================

/// Reports the last allocated user id.
pub async fn current_user(State(state): State<AppState>) -> Json<ResponseBody> {
    let data = CurrentUserData {
        current_user_id: state.counter.value(),
    };
    Json(ResponseBody::success("Success", serde_json::json!(data)))
}

/// Creates a user after a simulated storage delay.
pub async fn create_user(State(state): State<AppState>) -> (StatusCode, Json<ResponseBody>) {
    if !state.work_delay.is_zero() {
        tokio::time::sleep(state.work_delay).await;
    }

    let user_id = state.counter.increment();
    get_metrics().set_users_created(user_id);
    tracing::info!(user_id, "user created");

    let data = CreatedUserData { user_id };
    (
        StatusCode::CREATED,
        Json(ResponseBody::success("success", serde_json::json!(data))),
    )
}

/// Records request count and latency per matched route.
pub async fn track_http_metrics(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let timer = LatencyTimer::new();
    let response = next.run(request).await;
    get_metrics().record_http_request(&method, &path, response.status().as_u16(), timer.elapsed_ms());

    response
}
