#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use idempotency_gateway::api::{create_router, AppState};
use idempotency_gateway::idempotency::{IdempotencyConfig, IdempotencyEnforcer};
use idempotency_gateway::models::UserCounter;
use idempotency_gateway::store::{
    CoordinationStore, MemoryStore, RedisStore, StoreError, StoreResult,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Simulated storage latency for `POST /user`, long enough for requests to overlap.
pub const WORK_DELAY: Duration = Duration::from_millis(200);

pub struct TestApp {
    pub router: Router,
    pub counter: Arc<UserCounter>,
    pub enforcer: Arc<IdempotencyEnforcer>,
}

pub fn build_app(store: Arc<dyn CoordinationStore>) -> TestApp {
    build_app_with(store, IdempotencyConfig::default(), WORK_DELAY)
}

pub fn build_app_with(
    store: Arc<dyn CoordinationStore>,
    config: IdempotencyConfig,
    work_delay: Duration,
) -> TestApp {
    let enforcer = Arc::new(IdempotencyEnforcer::new(Arc::clone(&store), config));
    let counter = Arc::new(UserCounter::new());
    let state = AppState::new(store, Arc::clone(&enforcer))
        .with_counter(Arc::clone(&counter))
        .with_work_delay(work_delay);

    TestApp {
        router: create_router(state),
        counter,
        enforcer,
    }
}

pub fn unique_token() -> String {
    format!("test-{}", uuid::Uuid::new_v4())
}

pub fn post_user(token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/user")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Idempotency-Key", token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

pub fn retry_header(response: &Response) -> Option<String> {
    response
        .headers()
        .get("Idempotency-Retry")
        .map(|v| v.to_str().unwrap().to_string())
}

pub async fn setup_redis_store() -> RedisStore {
    dotenvy::dotenv().ok();

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let client = redis::Client::open(redis_url).expect("Invalid Redis URL");

    RedisStore::connect(&client)
        .await
        .expect("Failed to connect to test Redis")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOp {
    Incr,
    Expire,
    Get,
    SetWithTtl,
    Delete,
}

/// In-memory store that fails selected operations on demand.
pub struct FaultyStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<FaultOp>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn fail(&self, op: FaultOp) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn heal(&self, op: FaultOp) {
        self.failing.lock().unwrap().remove(&op);
    }

    fn check(&self, op: FaultOp) -> StoreResult<()> {
        if self.failing.lock().unwrap().contains(&op) {
            Err(StoreError::Unavailable(format!("injected {:?} failure", op)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CoordinationStore for FaultyStore {
    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.check(FaultOp::Incr)?;
        self.inner.incr(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.check(FaultOp::Expire)?;
        self.inner.expire(key, ttl).await
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        self.check(FaultOp::Incr)?;
        self.inner.incr_with_expiry(key, ttl).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check(FaultOp::Get)?;
        self.inner.get(key).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.check(FaultOp::SetWithTtl)?;
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.check(FaultOp::Delete)?;
        self.inner.delete(key).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        self.inner.ttl(key).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }

    fn backend(&self) -> &'static str {
        "faulty-memory"
    }
}
