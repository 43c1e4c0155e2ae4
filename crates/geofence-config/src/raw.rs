use std::env;

/// Unvalidated capture of every recognised environment variable (§6). Environment
/// variables are not structured data, so this is read field-by-field with
/// `env::var` rather than deserialized; [`crate::loader::load`] is responsible
/// for parsing, defaulting, and validating each field.
#[derive(Debug, Default)]
pub struct RawConfig {
    pub hysteresis_ms: Option<String>,
    pub dwell_thresholds_min: Option<String>,
    pub device_key_cache_ttl_s: Option<String>,
    pub delivery_max_attempts: Option<String>,
    pub delivery_backoff_base_ms: Option<String>,
    pub delivery_backoff_cap_ms: Option<String>,
    pub webhook_timeout_ms: Option<String>,
    pub worker_concurrency: Option<String>,
    pub broker_url: Option<String>,
    pub database_url: Option<String>,
    pub redb_path: Option<String>,
    pub encryption_key: Option<String>,
    pub api_bind_addr: Option<String>,
    pub api_auth_token: Option<String>,
}

impl RawConfig {
    pub fn from_env() -> Self {
        Self {
            hysteresis_ms: env::var("HYSTERESIS_MS").ok(),
            dwell_thresholds_min: env::var("DWELL_THRESHOLDS_MIN").ok(),
            device_key_cache_ttl_s: env::var("DEVICE_KEY_CACHE_TTL_S").ok(),
            delivery_max_attempts: env::var("DELIVERY_MAX_ATTEMPTS").ok(),
            delivery_backoff_base_ms: env::var("DELIVERY_BACKOFF_BASE_MS").ok(),
            delivery_backoff_cap_ms: env::var("DELIVERY_BACKOFF_CAP_MS").ok(),
            webhook_timeout_ms: env::var("WEBHOOK_TIMEOUT_MS").ok(),
            worker_concurrency: env::var("WORKER_CONCURRENCY").ok(),
            broker_url: env::var("BROKER_URL").ok(),
            database_url: env::var("DATABASE_URL").ok(),
            redb_path: env::var("REDB_PATH").ok(),
            encryption_key: env::var("ENCRYPTION_KEY").ok(),
            api_bind_addr: env::var("API_BIND_ADDR").ok(),
            api_auth_token: env::var("API_AUTH_TOKEN").ok(),
        }
    }
}
