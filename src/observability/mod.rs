pub mod logging;
pub mod metrics;
pub mod health;

pub use logging::{init_logging, mask_sensitive, LogConfig, LogFormat};
pub use self::metrics::{get_metrics, init_metrics, LatencyTimer, Metrics, METRICS};
pub use health::{AggregatedHealth, DependencyHealth, HealthChecker, HealthStatus};
