use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::idempotency::{enforce_idempotency, IdempotencyEnforcer};
use crate::models::UserCounter;
use crate::observability::HealthChecker;
use crate::store::CoordinationStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub enforcer: Arc<IdempotencyEnforcer>,
    pub counter: Arc<UserCounter>,
    pub work_delay: Duration,
    pub metrics_handle: Option<PrometheusHandle>,
    pub health_checker: Arc<HealthChecker>,
}

impl AppState {
    pub fn new(store: Arc<dyn CoordinationStore>, enforcer: Arc<IdempotencyEnforcer>) -> Self {
        Self {
            enforcer,
            counter: Arc::new(UserCounter::new()),
            work_delay: Duration::from_secs(3),
            metrics_handle: None,
            health_checker: Arc::new(HealthChecker::new(store)),
        }
    }

    /// Adds metrics handle to the state.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Replaces the user counter, e.g. to observe it from tests.
    pub fn with_counter(mut self, counter: Arc<UserCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Sets the simulated storage latency of `POST /user`.
    pub fn with_work_delay(mut self, delay: Duration) -> Self {
        self.work_delay = delay;
        self
    }
}

/// Creates the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    // Only mutating routes go through the idempotency layer.
    let protected = Router::new()
        .route("/user", post(handlers::create_user))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.enforcer),
            enforce_idempotency,
        ));

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check))
        // Metrics endpoint
        .route("/metrics", get(handlers::metrics_endpoint))
        // User endpoints
        .route("/", get(handlers::current_user))
        .merge(protected)
        .route_layer(middleware::from_fn(handlers::track_http_metrics))
        .with_state(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
