pub mod cache;
pub mod enforcer;
pub mod error;
pub mod key;
pub mod lock;
pub mod middleware;
pub mod snapshot;

pub use cache::{CachePolicy, ResponseCache};
pub use enforcer::{
    IdempotencyConfig, IdempotencyEnforcer, IdempotencyMetrics, MetricsSnapshot, Outcome,
    DEFAULT_HEADER_NAME, DEFAULT_RETRY_HEADER_NAME,
};
pub use error::{FailureStep, IdempotencyError};
pub use key::{request_fingerprint, IdempotencyToken, KeySpace};
pub use lock::{AcquireResult, LockGuard, LockManager, LockStrategy};
pub use middleware::enforce_idempotency;
pub use snapshot::{CachedBody, CachedResponse, HeaderEntry, ResponseBody};
