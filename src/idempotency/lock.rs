use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::error::{FailureStep, IdempotencyError};
use super::key::{IdempotencyToken, KeySpace};
use crate::observability::{get_metrics, LatencyTimer};
use crate::store::CoordinationStore;

/// How the lock counter and its expiry are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStrategy {
    /// Increment and expiry in one atomic unit; the window is fixed when the key is created.
    #[default]
    Atomic,
    /// `INCR` followed by a separate `EXPIRE` that refreshes the window on every attempt.
    TwoStep,
}

impl std::str::FromStr for LockStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "atomic" => Ok(LockStrategy::Atomic),
            "two_step" | "twostep" => Ok(LockStrategy::TwoStep),
            other => Err(format!("unknown lock strategy: {}", other)),
        }
    }
}

/// Outcome of a lock acquisition attempt.
#[derive(Debug)]
pub enum AcquireResult {
    /// This caller observed the counter at 1 and owns the lock.
    Owner(LockGuard),
    /// Another attempt holds the lock; `attempts` is the observed counter value.
    Contended { attempts: i64 },
}

/// Ownership of a token lock.
///
/// Call [`LockGuard::release`] on every normal exit path. A guard dropped
/// while still armed (panic, cancelled task) schedules the delete on the
/// current tokio runtime; without a runtime the lock lapses with its TTL.
pub struct LockGuard {
    store: Arc<dyn CoordinationStore>,
    key: String,
    armed: bool,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("armed", &self.armed)
            .finish()
    }
}

impl LockGuard {
    fn new(store: Arc<dyn CoordinationStore>, key: String) -> Self {
        Self {
            store,
            key,
            armed: true,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Deletes the lock key. Deleting an already expired key is not an error.
    pub async fn release(mut self) -> Result<(), IdempotencyError> {
        self.armed = false;
        let timer = LatencyTimer::new();
        let result = self.store.delete(&self.key).await;
        get_metrics().record_store_operation("delete", timer.elapsed_ms(), result.is_ok());

        match result {
            Ok(existed) => {
                if !existed {
                    debug!(lock_key = %self.key, "lock already expired at release");
                }
                Ok(())
            }
            Err(e) => Err(IdempotencyError::store(FailureStep::Release, e)),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let store = Arc::clone(&self.store);
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(lock_key = %key, "lock guard dropped without release, releasing in background");
                handle.spawn(async move {
                    if let Err(e) = store.delete(&key).await {
                        error!(
                            lock_key = %key,
                            step = %FailureStep::Release,
                            code = FailureStep::Release.code(),
                            "background lock release failed: {}",
                            e
                        );
                    }
                });
            }
            Err(_) => {
                warn!(lock_key = %key, "lock guard dropped outside a runtime, lock will lapse with its TTL");
            }
        }
    }
}

/// Mutual exclusion per token on top of the store's atomic counter.
pub struct LockManager {
    store: Arc<dyn CoordinationStore>,
    keys: KeySpace,
    ttl: Duration,
    strategy: LockStrategy,
}

impl LockManager {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        keys: KeySpace,
        ttl: Duration,
        strategy: LockStrategy,
    ) -> Self {
        Self {
            store,
            keys,
            ttl,
            strategy,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn strategy(&self) -> LockStrategy {
        self.strategy
    }

    /// Increments the token's lock counter and attaches the safety-window TTL.
    ///
    /// Any store failure is returned as an error; the caller must not run the
    /// downstream operation in that case.
    pub async fn acquire(&self, token: &IdempotencyToken) -> Result<AcquireResult, IdempotencyError> {
        let key = self.keys.lock_key(token);

        let attempts = match self.strategy {
            LockStrategy::Atomic => {
                let timer = LatencyTimer::new();
                let result = self.store.incr_with_expiry(&key, self.ttl).await;
                get_metrics().record_store_operation("incr_with_expiry", timer.elapsed_ms(), result.is_ok());
                result.map_err(|e| IdempotencyError::store(FailureStep::Acquire, e))?
            }
            LockStrategy::TwoStep => self.acquire_two_step(&key).await?,
        };

        debug!(lock_key = %key, attempts, "lock counter incremented");

        if attempts == 1 {
            Ok(AcquireResult::Owner(LockGuard::new(Arc::clone(&self.store), key)))
        } else {
            Ok(AcquireResult::Contended { attempts })
        }
    }

    async fn acquire_two_step(&self, key: &str) -> Result<i64, IdempotencyError> {
        let timer = LatencyTimer::new();
        let result = self.store.incr(key).await;
        get_metrics().record_store_operation("incr", timer.elapsed_ms(), result.is_ok());
        let attempts = result.map_err(|e| IdempotencyError::store(FailureStep::Acquire, e))?;

        let timer = LatencyTimer::new();
        let result = self.store.expire(key, self.ttl).await;
        get_metrics().record_store_operation("expire", timer.elapsed_ms(), result.is_ok());

        if let Err(e) = result {
            // An owner must not leave a counter behind that can never expire.
            if attempts == 1 {
                if let Err(cleanup) = self.store.delete(key).await {
                    error!(lock_key = %key, "failed to remove lock without expiry: {}", cleanup);
                }
            }
            return Err(IdempotencyError::store(FailureStep::Expire, e));
        }

        Ok(attempts)
    }

    /// Deletes the token's lock key regardless of who holds it.
    pub async fn release(&self, token: &IdempotencyToken) -> Result<(), IdempotencyError> {
        let key = self.keys.lock_key(token);
        self.store
            .delete(&key)
            .await
            .map(|_| ())
            .map_err(|e| IdempotencyError::store(FailureStep::Release, e))
    }
}
