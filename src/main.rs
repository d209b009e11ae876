use anyhow::Context;
use idempotency_gateway::api::{create_router, AppState};
use idempotency_gateway::config::{Settings, StoreBackend};
use idempotency_gateway::idempotency::{IdempotencyConfig, IdempotencyEnforcer};
use idempotency_gateway::observability::{init_logging, init_metrics, LogConfig};
use idempotency_gateway::store::{CoordinationStore, MemoryStore, RedisStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new().context("failed to load configuration")?;

    // Initialize logging
    init_logging(&LogConfig::from(&settings.logging));
    info!("Configuration loaded");

    // Connect to the coordination store
    let store: Arc<dyn CoordinationStore> = match settings.store.backend {
        StoreBackend::Redis => {
            let connection_info = settings.redis.connection_info()?;
            info!(addr = ?connection_info.addr, db = connection_info.redis.db, "Connecting to Redis...");
            let client = redis::Client::open(connection_info)?;
            let store = RedisStore::connect(&client)
                .await
                .context("failed to connect to Redis")?;
            info!("Redis connection established");
            Arc::new(store)
        }
        StoreBackend::Memory => {
            warn!("Using the in-process store; duplicates are only detected within this instance");
            Arc::new(MemoryStore::new())
        }
    };

    let config = IdempotencyConfig::from_settings(&settings.idempotency)?;
    info!(
        header = %config.header_name,
        namespace = %config.namespace,
        lock_ttl_secs = config.lock_ttl.as_secs(),
        cache_ttl_secs = config.cache_ttl.as_secs(),
        strategy = ?config.lock_strategy,
        "Idempotency layer configured"
    );
    let enforcer = Arc::new(IdempotencyEnforcer::new(Arc::clone(&store), config));

    let mut state = AppState::new(store, enforcer)
        .with_work_delay(Duration::from_millis(settings.demo.work_delay_ms));
    if settings.metrics.enabled {
        state = state.with_metrics(init_metrics());
        info!("Prometheus metrics enabled at /metrics");
    }

    let app = create_router(state);

    let addr = format!("{}:{}", settings.application.host, settings.application.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
