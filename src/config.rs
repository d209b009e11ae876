use serde::Deserialize;

use crate::idempotency::{DEFAULT_HEADER_NAME, DEFAULT_RETRY_HEADER_NAME};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub redis: RedisSettings,
    pub store: StoreSettings,
    pub logging: LoggingSettings,
    pub metrics: MetricsSettings,
    pub idempotency: IdempotencySettings,
    pub demo: DemoSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub url: String,
    /// `host:port`, takes precedence over the host in `url`.
    pub address: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub db: Option<i64>,
}

impl RedisSettings {
    /// Connection info built from `url` with the discrete fields applied on top.
    pub fn connection_info(&self) -> redis::RedisResult<redis::ConnectionInfo> {
        use redis::IntoConnectionInfo;

        let base = match self.address.as_deref().filter(|a| !a.trim().is_empty()) {
            Some(address) => format!("redis://{}", address.trim()),
            None => self.url.clone(),
        };

        let mut info = base.as_str().into_connection_info()?;
        if let Some(username) = self.username.as_ref().filter(|u| !u.is_empty()) {
            info.redis.username = Some(username.clone());
        }
        if let Some(password) = self.password.as_ref().filter(|p| !p.is_empty()) {
            info.redis.password = Some(password.clone());
        }
        if let Some(db) = self.db {
            info.redis.db = db;
        }
        Ok(info)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    pub backend: StoreBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdempotencySettings {
    pub header_name: String,
    pub retry_header_name: String,
    /// Key prefix in the store; defaults to `header_name`.
    pub namespace: Option<String>,
    pub lock_ttl_secs: u64,
    pub cache_ttl_secs: u64,
    pub cacheable_statuses: Vec<u16>,
    pub lock_strategy: String,
    pub verify_fingerprint: bool,
    pub max_body_bytes: usize,
}

impl Default for IdempotencySettings {
    fn default() -> Self {
        Self {
            header_name: DEFAULT_HEADER_NAME.to_string(),
            retry_header_name: DEFAULT_RETRY_HEADER_NAME.to_string(),
            namespace: None,
            lock_ttl_secs: 60,
            cache_ttl_secs: 86_400,
            cacheable_statuses: vec![200, 201],
            lock_strategy: "atomic".to_string(),
            verify_fingerprint: true,
            max_body_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DemoSettings {
    /// Simulated storage latency of `POST /user`.
    pub work_delay_ms: u64,
}

/// Variables read by earlier deployments, mapped onto `redis.*`.
const LEGACY_REDIS_ENV: [(&str, &str); 4] = [
    ("REDIS_ADDRESS", "redis.address"),
    ("REDIS_USERNAME", "redis.username"),
    ("REDIS_PASSWORD", "redis.password"),
    ("REDIS_DB", "redis.db"),
];

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        let defaults = IdempotencySettings::default();

        let mut builder = config::Config::builder()
            .set_default("application.host", "0.0.0.0")?
            .set_default("application.port", 3000)?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("store.backend", "redis")?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .set_default("metrics.enabled", true)?
            .set_default("idempotency.header_name", defaults.header_name)?
            .set_default("idempotency.retry_header_name", defaults.retry_header_name)?
            .set_default("idempotency.lock_ttl_secs", defaults.lock_ttl_secs)?
            .set_default("idempotency.cache_ttl_secs", defaults.cache_ttl_secs)?
            .set_default(
                "idempotency.cacheable_statuses",
                defaults
                    .cacheable_statuses
                    .iter()
                    .map(|s| i64::from(*s))
                    .collect::<Vec<i64>>(),
            )?
            .set_default("idempotency.lock_strategy", defaults.lock_strategy)?
            .set_default("idempotency.verify_fingerprint", defaults.verify_fingerprint)?
            .set_default("idempotency.max_body_bytes", defaults.max_body_bytes as u64)?
            .set_default("demo.work_delay_ms", 3000)?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("idempotency.cacheable_statuses")
                    .try_parsing(true),
            );

        for (var, key) in LEGACY_REDIS_ENV {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    builder = builder.set_override(key, value)?;
                }
            }
        }

        Ok(builder)
    }
}
