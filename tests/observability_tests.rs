mod common;

use common::{FaultOp, FaultyStore};
use idempotency_gateway::idempotency::IdempotencyToken;
use idempotency_gateway::observability::{
    mask_sensitive, AggregatedHealth, DependencyHealth, HealthChecker, HealthStatus,
    LatencyTimer, LogConfig, LogFormat, Metrics,
};
use idempotency_gateway::store::MemoryStore;
use std::sync::Arc;

#[test]
fn test_log_config_default() {
    let config = LogConfig::default();
    assert_eq!(config.level, "info");
    assert_eq!(config.format, LogFormat::Pretty);
    assert!(config.include_target);
    assert!(!config.include_file);
    assert!(!config.include_line);
}

#[test]
fn test_log_format_from_str() {
    assert_eq!(LogFormat::from("json"), LogFormat::Json);
    assert_eq!(LogFormat::from("COMPACT"), LogFormat::Compact);
    assert_eq!(LogFormat::from(""), LogFormat::Pretty);
}

#[test]
fn test_mask_sensitive_exact_boundary() {
    assert_eq!(mask_sensitive("1234", 2), "****");
    assert_eq!(mask_sensitive("12345", 2), "12*45");
}

#[test]
fn test_token_is_masked_for_logs() {
    let token = IdempotencyToken::parse("3f9c2b7e-8d41-4a55-9a0e-1c2d3e4f5a6b").unwrap();
    let masked = token.masked();
    assert!(masked.starts_with("3f9c"));
    assert!(masked.ends_with("5a6b"));
    assert!(!masked.contains("8d41"));
    assert_eq!(masked.len(), token.as_str().len());
}

#[test]
fn test_short_token_is_fully_masked() {
    let token = IdempotencyToken::parse("abc").unwrap();
    assert_eq!(token.masked(), "***");
}

#[test]
fn test_metrics_idempotency_recording() {
    let metrics = Metrics::new();
    for outcome in ["pass_through", "executed", "cached", "replayed", "conflict", "failed"] {
        metrics.record_idempotency_outcome(outcome);
    }
    metrics.record_idempotency_failure("store");
    metrics.record_lock_contention(3);
}

#[test]
fn test_metrics_store_and_http_recording() {
    let metrics = Metrics::new();
    metrics.record_store_operation("incr_with_expiry", 0.8, true);
    metrics.record_store_operation("delete", 1.5, false);
    metrics.record_http_request("POST", "/user", 201, 3000.0);
    metrics.set_users_created(7);
}

#[test]
fn test_latency_timer() {
    let timer = LatencyTimer::new();
    std::thread::sleep(std::time::Duration::from_millis(10));
    let elapsed = timer.elapsed_ms();
    assert!(elapsed >= 10.0);
    assert!(elapsed < 1000.0);
}

#[test]
fn test_aggregated_health_worst_status_wins() {
    let dependencies = vec![
        DependencyHealth::healthy("memory", 0.1),
        DependencyHealth::degraded("redis", "Slow"),
    ];
    let health = AggregatedHealth::new("1.0.0".to_string(), 3600, dependencies);
    assert_eq!(health.status, HealthStatus::Degraded);
    assert_eq!(health.uptime_seconds, 3600);

    let empty = AggregatedHealth::new("1.0.0".to_string(), 0, vec![]);
    assert_eq!(empty.status, HealthStatus::Healthy);
}

#[test]
fn test_health_serialization() {
    let health = AggregatedHealth::new(
        "1.0.0".to_string(),
        100,
        vec![DependencyHealth::healthy("redis", 5.5)],
    );
    let json = serde_json::to_string(&health).unwrap();

    assert!(json.contains("\"status\":\"healthy\""));
    assert!(json.contains("\"name\":\"redis\""));
    assert!(json.contains("\"latency_ms\":5.5"));
    assert!(json.contains("\"uptime_seconds\":100"));
}

#[tokio::test]
async fn test_health_checker_reports_store_backend() {
    let checker = HealthChecker::new(Arc::new(MemoryStore::new()));

    let health = checker.check_all().await;
    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(health.dependencies.len(), 1);
    assert_eq!(health.dependencies[0].name, "memory");
    assert!(health.dependencies[0].latency_ms.is_some());
    assert!(checker.is_alive());
    assert!(checker.is_ready().await);
}

#[tokio::test]
async fn test_health_checker_ignores_data_path_faults() {
    // PING is independent of the data operations the store fails.
    let store = Arc::new(FaultyStore::new());
    store.fail(FaultOp::Incr);
    store.fail(FaultOp::Get);

    let checker = HealthChecker::new(store);
    assert_eq!(checker.check_store().await.name, "faulty-memory");
    assert!(checker.is_ready().await);
}
