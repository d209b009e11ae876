use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::observability::{AggregatedHealth, DependencyHealth, HealthStatus};

/// `data` of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUserData {
    pub current_user_id: u64,
}

/// `data` of `POST /user`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedUserData {
    pub user_id: u64,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub dependencies: Vec<DependencyHealth>,
}

impl From<AggregatedHealth> for HealthResponse {
    fn from(health: AggregatedHealth) -> Self {
        Self {
            status: health.status,
            version: health.version,
            timestamp: Utc::now(),
            uptime_seconds: health.uptime_seconds,
            dependencies: health.dependencies,
        }
    }
}
