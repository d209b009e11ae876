use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::cache::{CachePolicy, ResponseCache};
use super::error::{FailureStep, IdempotencyError};
use super::key::{IdempotencyToken, KeySpace};
use super::lock::{AcquireResult, LockManager, LockStrategy};
use super::snapshot::{CachedResponse, ResponseBody};
use crate::config::IdempotencySettings;
use crate::error::AppError;
use crate::observability::get_metrics;
use crate::store::CoordinationStore;

pub const DEFAULT_HEADER_NAME: &str = "Idempotency-Key";
pub const DEFAULT_RETRY_HEADER_NAME: &str = "Idempotency-Retry";

/// How a request left the middleware. Attached to every response as an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// No token: the downstream ran without locking or caching.
    PassThrough,
    /// The downstream ran; its status was not cacheable.
    Executed,
    /// The downstream ran and its response was cached.
    Cached,
    /// A cached response was returned without running the downstream.
    Replayed,
    /// Another request with the same token held the lock.
    Conflict,
    /// The token was reused for a request with a different fingerprint.
    FingerprintMismatch,
    /// Infrastructure failure at the given step.
    Failed(FailureStep),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::PassThrough => "pass_through",
            Outcome::Executed => "executed",
            Outcome::Cached => "cached",
            Outcome::Replayed => "replayed",
            Outcome::Conflict => "conflict",
            Outcome::FingerprintMismatch => "fingerprint_mismatch",
            Outcome::Failed(_) => "failed",
        }
    }
}

/// Per-enforcer counters.
#[derive(Debug, Default)]
pub struct IdempotencyMetrics {
    pub total_requests: AtomicU64,
    pub pass_through: AtomicU64,
    pub executed: AtomicU64,
    pub replayed: AtomicU64,
    pub conflicts: AtomicU64,
    pub fingerprint_mismatches: AtomicU64,
    pub failures: AtomicU64,
}

impl IdempotencyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: Outcome) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Outcome::PassThrough => &self.pass_through,
            Outcome::Executed | Outcome::Cached => &self.executed,
            Outcome::Replayed => &self.replayed,
            Outcome::Conflict => &self.conflicts,
            Outcome::FingerprintMismatch => &self.fingerprint_mismatches,
            Outcome::Failed(_) => &self.failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            pass_through: self.pass_through.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            replayed: self.replayed.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            fingerprint_mismatches: self.fingerprint_mismatches.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub pass_through: u64,
    pub executed: u64,
    pub replayed: u64,
    pub conflicts: u64,
    pub fingerprint_mismatches: u64,
    pub failures: u64,
}

impl MetricsSnapshot {
    /// Share of token-carrying requests answered from cache or rejected as duplicates.
    pub fn duplicate_rate(&self) -> f64 {
        let protected = self.total_requests.saturating_sub(self.pass_through);
        if protected == 0 {
            0.0
        } else {
            (self.replayed + self.conflicts) as f64 / protected as f64
        }
    }
}

/// Runtime configuration of the idempotency protocol.
#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    pub header_name: HeaderName,
    pub retry_header_name: HeaderName,
    pub namespace: String,
    pub lock_ttl: Duration,
    pub cache_ttl: Duration,
    pub cache_policy: CachePolicy,
    pub lock_strategy: LockStrategy,
    pub verify_fingerprint: bool,
    pub max_body_bytes: usize,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            header_name: HeaderName::from_static("idempotency-key"),
            retry_header_name: HeaderName::from_static("idempotency-retry"),
            namespace: DEFAULT_HEADER_NAME.to_string(),
            lock_ttl: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(86_400), // 24 hours
            cache_policy: CachePolicy::default(),
            lock_strategy: LockStrategy::Atomic,
            verify_fingerprint: true,
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl IdempotencyConfig {
    pub fn from_settings(settings: &IdempotencySettings) -> Result<Self, AppError> {
        let header_name = HeaderName::from_bytes(settings.header_name.as_bytes()).map_err(|e| {
            AppError::Validation(format!("invalid header_name {:?}: {}", settings.header_name, e))
        })?;
        let retry_header_name = HeaderName::from_bytes(settings.retry_header_name.as_bytes())
            .map_err(|e| {
                AppError::Validation(format!(
                    "invalid retry_header_name {:?}: {}",
                    settings.retry_header_name, e
                ))
            })?;

        if settings.lock_ttl_secs == 0 {
            return Err(AppError::Validation("lock_ttl_secs must be positive".to_string()));
        }
        if settings.cache_ttl_secs == 0 {
            return Err(AppError::Validation("cache_ttl_secs must be positive".to_string()));
        }
        if settings.cacheable_statuses.iter().any(|s| !(100..=599).contains(s)) {
            return Err(AppError::Validation(format!(
                "cacheable_statuses contains an invalid status: {:?}",
                settings.cacheable_statuses
            )));
        }

        let lock_strategy = settings
            .lock_strategy
            .parse::<LockStrategy>()
            .map_err(AppError::Validation)?;

        // Keys keep the header's configured spelling, e.g. "Idempotency-Key-Lock-<token>".
        let namespace = settings
            .namespace
            .clone()
            .filter(|ns| !ns.trim().is_empty())
            .unwrap_or_else(|| settings.header_name.clone());

        Ok(Self {
            header_name,
            retry_header_name,
            namespace,
            lock_ttl: Duration::from_secs(settings.lock_ttl_secs),
            cache_ttl: Duration::from_secs(settings.cache_ttl_secs),
            cache_policy: CachePolicy::new(settings.cacheable_statuses.clone()),
            lock_strategy,
            verify_fingerprint: settings.verify_fingerprint,
            max_body_bytes: settings.max_body_bytes,
        })
    }
}

/// Runs the idempotency protocol around a downstream operation.
///
/// Per token: acquire the lock, replay a cached response if one exists,
/// otherwise run the downstream and cache a cacheable result, then release
/// the lock. Every path produces a definite response.
pub struct IdempotencyEnforcer {
    locks: LockManager,
    cache: ResponseCache,
    config: IdempotencyConfig,
    metrics: Arc<IdempotencyMetrics>,
}

impl IdempotencyEnforcer {
    pub fn new(store: Arc<dyn CoordinationStore>, config: IdempotencyConfig) -> Self {
        let keys = KeySpace::new(config.namespace.clone());
        let locks = LockManager::new(
            Arc::clone(&store),
            keys.clone(),
            config.lock_ttl,
            config.lock_strategy,
        );
        let cache = ResponseCache::new(store, keys, config.cache_ttl, config.cache_policy.clone());

        Self {
            locks,
            cache,
            config,
            metrics: Arc::new(IdempotencyMetrics::new()),
        }
    }

    pub fn config(&self) -> &IdempotencyConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<IdempotencyMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    pub fn response_cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Executes `downstream` under the protocol for `token`.
    ///
    /// `fingerprint` identifies the request payload; when present it is stored
    /// with the cached response and compared on replay.
    pub async fn execute<F, Fut>(
        &self,
        token: Option<IdempotencyToken>,
        fingerprint: Option<String>,
        downstream: F,
    ) -> Response
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Response>,
    {
        let Some(token) = token else {
            debug!("no idempotency key, skipping idempotency check");
            let response = downstream().await;
            return self.finish(Outcome::PassThrough, response);
        };

        let guard = match self.locks.acquire(&token).await {
            Ok(AcquireResult::Owner(guard)) => guard,
            Ok(AcquireResult::Contended { attempts }) => {
                warn!(token = %token.masked(), attempts, "duplicate request in flight");
                get_metrics().record_lock_contention(attempts);
                let response = (
                    StatusCode::CONFLICT,
                    Json(ResponseBody::failure("Duplicate request")),
                )
                    .into_response();
                return self.finish(Outcome::Conflict, response);
            }
            Err(e) => {
                let response = self.failure(&token, &e);
                return self.finish(Outcome::Failed(e.step()), response);
            }
        };

        debug!(token = %token.masked(), lock_key = guard.key(), "lock acquired");

        let (outcome, response) = self.run_locked(&token, fingerprint, downstream).await;

        // Runs after any cache write so the write always happens under the lock.
        if let Err(e) = guard.release().await {
            error!(
                token = %token.masked(),
                step = %e.step(),
                code = e.code(),
                "failed to release idempotency lock: {}",
                e
            );
            get_metrics().record_idempotency_failure(e.step().as_str());
        }

        self.finish(outcome, response)
    }

    async fn run_locked<F, Fut>(
        &self,
        token: &IdempotencyToken,
        fingerprint: Option<String>,
        downstream: F,
    ) -> (Outcome, Response)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Response>,
    {
        match self.cache.lookup(token).await {
            Ok(Some(cached)) => return self.replay(token, fingerprint.as_deref(), cached),
            Ok(None) => {}
            Err(e) => return (Outcome::Failed(e.step()), self.failure(token, &e)),
        }

        let response = downstream().await;
        let status = response.status();

        if !self.cache.policy().is_cacheable(status.as_u16()) {
            debug!(token = %token.masked(), status = status.as_u16(), "response not cacheable");
            return (Outcome::Executed, response);
        }

        let (parts, body) = response.into_parts();
        let bytes = match axum::body::to_bytes(body, self.config.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = IdempotencyError::Capture {
                    reason: e.to_string(),
                };
                return (Outcome::Failed(err.step()), self.failure(token, &err));
            }
        };

        let snapshot = match CachedResponse::capture(parts.status, &parts.headers, &bytes, fingerprint) {
            Ok(snapshot) => snapshot,
            Err(e) => return (Outcome::Failed(e.step()), self.failure(token, &e)),
        };

        // The downstream side effect has already happened; a failed write is still reported.
        if let Err(e) = self.cache.store(token, &snapshot).await {
            return (Outcome::Failed(e.step()), self.failure(token, &e));
        }

        info!(token = %token.masked(), status = status.as_u16(), "cached idempotent response");
        (Outcome::Cached, Response::from_parts(parts, Body::from(bytes)))
    }

    fn replay(
        &self,
        token: &IdempotencyToken,
        fingerprint: Option<&str>,
        cached: CachedResponse,
    ) -> (Outcome, Response) {
        if self.config.verify_fingerprint {
            if let (Some(stored), Some(current)) = (cached.request_fingerprint.as_deref(), fingerprint) {
                if stored != current {
                    warn!(token = %token.masked(), "idempotency key reused with a different request");
                    let response = (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        Json(ResponseBody::failure(
                            "Idempotency-Key reused with a different request",
                        )),
                    )
                        .into_response();
                    return (Outcome::FingerprintMismatch, response);
                }
            }
        }

        match cached.to_response() {
            Ok(mut response) => {
                info!(token = %token.masked(), status = cached.status, "returning cached response");
                response
                    .headers_mut()
                    .insert(self.config.retry_header_name.clone(), HeaderValue::from_static("true"));
                (Outcome::Replayed, response)
            }
            Err(e) => (Outcome::Failed(e.step()), self.failure(token, &e)),
        }
    }

    /// Answers a request that failed before the protocol took the lock.
    pub fn reject(&self, token: &IdempotencyToken, err: &IdempotencyError) -> Response {
        let response = self.failure(token, err);
        self.finish(Outcome::Failed(err.step()), response)
    }

    /// Generic 500 carrying the step's diagnostic code.
    fn failure(&self, token: &IdempotencyToken, err: &IdempotencyError) -> Response {
        let step = err.step();
        error!(
            token = %token.masked(),
            step = %step,
            code = step.code(),
            "idempotency protocol failed: {}",
            err
        );
        get_metrics().record_idempotency_failure(step.as_str());

        let mut response = (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ResponseBody::failure(format!(
                "Something went wrong, please try again later. [Code: {}]",
                step.code()
            ))),
        )
            .into_response();

        if matches!(err, IdempotencyError::CorruptEntry { .. }) {
            response
                .headers_mut()
                .insert(self.config.retry_header_name.clone(), HeaderValue::from_static("false"));
        }
        response
    }

    fn finish(&self, outcome: Outcome, mut response: Response) -> Response {
        self.metrics.record(outcome);
        get_metrics().record_idempotency_outcome(outcome.as_str());
        response.extensions_mut().insert(outcome);
        response
    }
}
