//! Shared coordination store used by the idempotency protocol.
//!
//! The protocol only needs single-key atomicity: an atomic counter increment,
//! key expiry, plain get/set-with-TTL and delete. Production deployments use
//! Redis; the in-process [`MemoryStore`] backs tests and single-node runs.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures reported by a coordination store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("value at {key} is not an integer")]
    WrongType { key: String },
}

/// Key/value operations the idempotency protocol relies on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Atomically increments the integer at `key` (created at 0) and returns the new value.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Sets the time-to-live of `key`. Returns false if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Increments `key` and attaches `ttl` if the key carries no expiry, as one atomic unit.
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> StoreResult<i64>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Removes `key`. Returns whether a key was actually removed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Remaining time-to-live of `key`; `None` when the key is absent or never expires.
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    async fn ping(&self) -> StoreResult<()>;

    /// Short backend name used in logs and health reports.
    fn backend(&self) -> &'static str;
}

/// Whole seconds for a store TTL, never below one second.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_secs_rounds_down_with_floor_of_one() {
        assert_eq!(ttl_secs(Duration::from_secs(60)), 60);
        assert_eq!(ttl_secs(Duration::from_millis(1500)), 1);
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
        assert_eq!(ttl_secs(Duration::ZERO), 1);
    }
}
