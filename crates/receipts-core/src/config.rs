use std::path::Path;
use std::time::Duration;

use jsonschema::validator_for;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

pub const DEFAULT_MAX_BATCH_SIZE: usize = 25;
pub const DEFAULT_WINDOW_MS: u64 = 5_000;
pub const DEFAULT_RETRY_BASE_MS: u64 = 500;
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
/// Upper bound on `max_batch_size`; one request never carries more ids.
pub const MAX_BATCH_SIZE_LIMIT: usize = 10_000;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("config does not match schema: {0}")]
    Schema(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for windowing and delivery.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Close a window once this many ids are buffered.
    #[serde(default = "default_max_batch_size")]
    #[schemars(range(min = 1, max = 10_000))]
    pub max_batch_size: usize,
    /// Close a non-empty window this long after it opened (milliseconds).
    #[serde(default = "default_window_ms")]
    #[schemars(range(min = 1))]
    pub window_ms: u64,
    /// Delay before the first retry; doubles for each further retry (milliseconds).
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// Total acknowledgement attempts per batch, first try included.
    #[serde(default = "default_retry_max_attempts")]
    #[schemars(range(min = 1))]
    pub retry_max_attempts: u32,
    /// Gate state used when no connectivity probe is wired in.
    #[serde(default = "default_start_online")]
    pub start_online: bool,
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

fn default_retry_base_ms() -> u64 {
    DEFAULT_RETRY_BASE_MS
}

fn default_retry_max_attempts() -> u32 {
    DEFAULT_RETRY_MAX_ATTEMPTS
}

fn default_start_online() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            window_ms: DEFAULT_WINDOW_MS,
            retry_base_ms: DEFAULT_RETRY_BASE_MS,
            retry_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            start_online: true,
        }
    }
}

impl PipelineConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.retry_base_ms),
            self.retry_max_attempts,
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::Invalid("max_batch_size must be at least 1".into()));
        }
        if self.max_batch_size > MAX_BATCH_SIZE_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_batch_size must be at most {MAX_BATCH_SIZE_LIMIT}"
            )));
        }
        if self.window_ms == 0 {
            return Err(ConfigError::Invalid("window_ms must be at least 1".into()));
        }
        if self.retry_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry_max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Apply `RECEIPTS_*` environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_u64("RECEIPTS_MAX_BATCH_SIZE") {
            self.max_batch_size = usize::try_from(v).unwrap_or(usize::MAX);
        }
        if let Some(v) = env_u64("RECEIPTS_WINDOW_MS") {
            self.window_ms = v;
        }
        if let Some(v) = env_u64("RECEIPTS_RETRY_BASE_MS") {
            self.retry_base_ms = v;
        }
        if let Some(v) = env_u64("RECEIPTS_RETRY_MAX_ATTEMPTS") {
            self.retry_max_attempts = v.min(u32::MAX as u64) as u32;
        }
        if let Some(v) = env_bool("RECEIPTS_START_ONLINE") {
            self.start_online = v;
        }
    }

    /// Defaults plus environment overrides, for hosts without a config file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Returns the JSON schema describing `T`.
pub fn config_schema_json<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(&schema).unwrap_or_else(|_| serde_json::json!({}))
}

/// Parse TOML text, check it against `T`'s schema, then deserialize.
pub fn parse_toml<T>(content: &str) -> Result<T, ConfigError>
where
    T: DeserializeOwned + JsonSchema,
{
    let raw: toml::Value = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let json_value = serde_json::to_value(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let schema = config_schema_json::<T>();
    let validator = validator_for(&schema).map_err(|e| ConfigError::Schema(e.to_string()))?;
    let validation_errors: Vec<_> = validator
        .iter_errors(&json_value)
        .map(|e| e.to_string())
        .collect();
    if !validation_errors.is_empty() {
        return Err(ConfigError::Schema(validation_errors.join(", ")));
    }
    toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
}

pub fn load_toml<T>(path: impl AsRef<Path>) -> Result<T, ConfigError>
where
    T: DeserializeOwned + JsonSchema,
{
    let content = std::fs::read_to_string(path)?;
    parse_toml(&content)
}

/// Load a pipeline config file, apply env overrides and validate.
pub fn load_config(path: impl AsRef<Path>) -> Result<PipelineConfig, ConfigError> {
    let mut cfg: PipelineConfig = load_toml(path)?;
    cfg.apply_env_overrides();
    cfg.validate()?;
    Ok(cfg)
}

/// Parse a boolean-like flag: 1/0, true/false, yes/no, on/off (case-insensitive).
pub fn parse_bool_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| parse_bool_flag(&raw))
}

pub fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
}
