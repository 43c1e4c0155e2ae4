use crate::error::ConfigError;
use crate::raw::RawConfig;

/// Validated runtime configuration (§6). Everything the pipeline's components
/// need to start; defaults match the spec where a variable is absent, and an
/// out-of-range or unparsable value that *is* present is a startup error.
#[derive(Debug, Clone)]
pub struct Config {
    pub hysteresis_ms: i64,
    pub dwell_thresholds_min: Vec<i64>,
    pub device_key_cache_ttl_s: u64,
    pub delivery_max_attempts: u32,
    pub delivery_backoff_base_ms: u64,
    pub delivery_backoff_cap_ms: u64,
    pub webhook_timeout_ms: u64,
    pub worker_concurrency: usize,
    pub broker_url: String,
    pub database_url: Option<String>,
    pub redb_path: String,
    pub encryption_key: Option<[u8; 32]>,
    pub api_bind_addr: String,
    pub api_auth_token: Option<String>,
}

const DEFAULT_HYSTERESIS_MS: i64 = 20_000;
const DEFAULT_DWELL_THRESHOLDS_MIN: &[i64] = &[5, 10, 15, 30, 60, 120];
const DEFAULT_DEVICE_KEY_CACHE_TTL_S: u64 = 300;
const DEFAULT_DELIVERY_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_DELIVERY_BACKOFF_BASE_MS: u64 = 2000;
const DEFAULT_DELIVERY_BACKOFF_CAP_MS: u64 = 5 * 60 * 1000;
const DEFAULT_WEBHOOK_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_WORKER_CONCURRENCY: usize = 10;
const DEFAULT_REDB_PATH: &str = "geofence-state.redb";
const DEFAULT_API_BIND_ADDR: &str = "0.0.0.0:8080";

/// Loads and validates configuration from the process environment.
pub fn load() -> Result<Config, ConfigError> {
    convert(RawConfig::from_env())
}

fn convert(raw: RawConfig) -> Result<Config, ConfigError> {
    Ok(Config {
        hysteresis_ms: parse_or_default(&raw.hysteresis_ms, "HYSTERESIS_MS", DEFAULT_HYSTERESIS_MS)?,
        dwell_thresholds_min: parse_dwell_thresholds(raw.dwell_thresholds_min.as_deref())?,
        device_key_cache_ttl_s: parse_or_default(
            &raw.device_key_cache_ttl_s,
            "DEVICE_KEY_CACHE_TTL_S",
            DEFAULT_DEVICE_KEY_CACHE_TTL_S,
        )?,
        delivery_max_attempts: parse_or_default(
            &raw.delivery_max_attempts,
            "DELIVERY_MAX_ATTEMPTS",
            DEFAULT_DELIVERY_MAX_ATTEMPTS,
        )?,
        delivery_backoff_base_ms: parse_or_default(
            &raw.delivery_backoff_base_ms,
            "DELIVERY_BACKOFF_BASE_MS",
            DEFAULT_DELIVERY_BACKOFF_BASE_MS,
        )?,
        delivery_backoff_cap_ms: parse_or_default(
            &raw.delivery_backoff_cap_ms,
            "DELIVERY_BACKOFF_CAP_MS",
            DEFAULT_DELIVERY_BACKOFF_CAP_MS,
        )?,
        webhook_timeout_ms: parse_or_default(
            &raw.webhook_timeout_ms,
            "WEBHOOK_TIMEOUT_MS",
            DEFAULT_WEBHOOK_TIMEOUT_MS,
        )?,
        worker_concurrency: parse_or_default(
            &raw.worker_concurrency,
            "WORKER_CONCURRENCY",
            DEFAULT_WORKER_CONCURRENCY,
        )?,
        broker_url: raw.broker_url.unwrap_or_else(|| "nats://127.0.0.1:4222".to_string()),
        database_url: raw.database_url,
        redb_path: raw.redb_path.unwrap_or_else(|| DEFAULT_REDB_PATH.to_string()),
        encryption_key: parse_encryption_key(raw.encryption_key.as_deref())?,
        api_bind_addr: raw.api_bind_addr.unwrap_or_else(|| DEFAULT_API_BIND_ADDR.to_string()),
        api_auth_token: raw.api_auth_token,
    })
}

fn parse_or_default<T>(value: &Option<String>, var: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match value {
        None => Ok(default),
        Some(s) => s.parse::<T>().map_err(|_| ConfigError::Invalid {
            var: var.to_string(),
            message: format!("could not parse '{s}'"),
        }),
    }
}

fn parse_dwell_thresholds(value: Option<&str>) -> Result<Vec<i64>, ConfigError> {
    let Some(s) = value else {
        return Ok(DEFAULT_DWELL_THRESHOLDS_MIN.to_vec());
    };
    let thresholds: Result<Vec<i64>, _> = s
        .split(',')
        .map(|part| part.trim().parse::<i64>())
        .collect();
    let thresholds = thresholds.map_err(|_| ConfigError::Invalid {
        var: "DWELL_THRESHOLDS_MIN".to_string(),
        message: format!("expected a comma-separated list of integers, got '{s}'"),
    })?;
    if thresholds.is_empty() {
        return Err(ConfigError::Invalid {
            var: "DWELL_THRESHOLDS_MIN".to_string(),
            message: "must contain at least one threshold".to_string(),
        });
    }
    let mut sorted = thresholds.clone();
    sorted.sort_unstable();
    if sorted != thresholds {
        return Err(ConfigError::Invalid {
            var: "DWELL_THRESHOLDS_MIN".to_string(),
            message: "thresholds must be in ascending order".to_string(),
        });
    }
    Ok(thresholds)
}

fn parse_encryption_key(value: Option<&str>) -> Result<Option<[u8; 32]>, ConfigError> {
    let Some(hex_str) = value else { return Ok(None) };
    let bytes = decode_hex(hex_str).map_err(|message| ConfigError::Invalid {
        var: "ENCRYPTION_KEY".to_string(),
        message,
    })?;
    let arr: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| ConfigError::Invalid {
        var: "ENCRYPTION_KEY".to_string(),
        message: format!("expected 32 bytes (64 hex chars), got {}", v.len()),
    })?;
    Ok(Some(arr))
}

fn decode_hex(s: &str) -> Result<Vec<u8>, String> {
    if s.len() % 2 != 0 {
        return Err("hex string must have an even length".to_string());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}
