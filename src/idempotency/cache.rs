use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::error::{FailureStep, IdempotencyError};
use super::key::{IdempotencyToken, KeySpace};
use super::snapshot::CachedResponse;
use crate::observability::{get_metrics, LatencyTimer};
use crate::store::CoordinationStore;

/// Which downstream outcomes count as fully completed and may be replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    cacheable_statuses: Vec<u16>,
}

impl CachePolicy {
    pub fn new(cacheable_statuses: impl Into<Vec<u16>>) -> Self {
        Self {
            cacheable_statuses: cacheable_statuses.into(),
        }
    }

    pub fn is_cacheable(&self, status: u16) -> bool {
        self.cacheable_statuses.contains(&status)
    }

    pub fn statuses(&self) -> &[u16] {
        &self.cacheable_statuses
    }
}

impl Default for CachePolicy {
    /// 200 OK and 201 Created.
    fn default() -> Self {
        Self::new(vec![200, 201])
    }
}

/// Long-lived store of completed responses keyed by token.
pub struct ResponseCache {
    store: Arc<dyn CoordinationStore>,
    keys: KeySpace,
    ttl: Duration,
    policy: CachePolicy,
}

impl ResponseCache {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        keys: KeySpace,
        ttl: Duration,
        policy: CachePolicy,
    ) -> Self {
        Self {
            store,
            keys,
            ttl,
            policy,
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Reads the cached response for `token`.
    ///
    /// A missing key is `Ok(None)`. A value that does not decode is reported as
    /// [`IdempotencyError::CorruptEntry`] and never treated as a miss.
    pub async fn lookup(
        &self,
        token: &IdempotencyToken,
    ) -> Result<Option<CachedResponse>, IdempotencyError> {
        let key = self.keys.cache_key(token);

        let timer = LatencyTimer::new();
        let result = self.store.get(&key).await;
        get_metrics().record_store_operation("get", timer.elapsed_ms(), result.is_ok());

        let raw = match result.map_err(|e| IdempotencyError::store(FailureStep::Lookup, e))? {
            Some(raw) => raw,
            None => {
                debug!(cache_key = %key, "no cached response");
                return Ok(None);
            }
        };

        CachedResponse::decode(&key, &raw).map(Some)
    }

    /// Writes `response` with the retention TTL. Last writer wins.
    pub async fn store(
        &self,
        token: &IdempotencyToken,
        response: &CachedResponse,
    ) -> Result<(), IdempotencyError> {
        let key = self.keys.cache_key(token);
        let encoded = response.encode()?;

        let timer = LatencyTimer::new();
        let result = self.store.set_with_ttl(&key, &encoded, self.ttl).await;
        get_metrics().record_store_operation("set_with_ttl", timer.elapsed_ms(), result.is_ok());
        result.map_err(|e| IdempotencyError::store(FailureStep::Store, e))?;

        debug!(cache_key = %key, status = response.status, ttl_secs = self.ttl.as_secs(), "cached response");
        Ok(())
    }
}
