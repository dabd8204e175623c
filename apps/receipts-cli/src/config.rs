use std::path::Path;

use anyhow::{Context, Result};
use receipts_core::{load_toml, PipelineConfig};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Host agent settings; pipeline tunables live under `[pipeline]`.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// URL receiving `POST {"message_ids": [...]}` per batch.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// URL polled for connectivity; when absent the gate stays at `pipeline.start_online`.
    #[serde(default)]
    pub probe_url: Option<String>,
    #[serde(default = "default_probe_interval_ms")]
    #[schemars(range(min = 10))]
    pub probe_interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    #[schemars(range(min = 1))]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

fn default_probe_interval_ms() -> u64 {
    2_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            probe_url: None,
            probe_interval_ms: default_probe_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AgentConfig {
    /// File (if any), then `RECEIPTS_*` env overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(path) => load_toml::<AgentConfig>(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => AgentConfig::default(),
        };
        if let Ok(endpoint) = std::env::var("RECEIPTS_ENDPOINT") {
            cfg.endpoint = Some(endpoint);
        }
        if let Ok(url) = std::env::var("RECEIPTS_PROBE_URL") {
            cfg.probe_url = Some(url);
        }
        cfg.pipeline.apply_env_overrides();
        cfg.pipeline.validate()?;
        Ok(cfg)
    }
}
