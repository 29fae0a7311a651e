use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use evm_core::{FetchPolicy, InteriorGapPolicy, DEFAULT_BATCH_SIZE, DEFAULT_MAX_INTERIOR_GAPS};
use serde::{Deserialize, Serialize};

use crate::LoadedConfig;

/// Typed view of the merged configuration. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorConfig {
    /// Controller serial numbers, processed in this order.
    pub controllers: Vec<u32>,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub base_url: String,
    #[serde(default = "default_gateway_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default = "default_events_table")]
    pub events_table: String,
    #[serde(default)]
    pub log_table: Option<String>,
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_max_interior_gaps")]
    pub max_interior_gaps: usize,
    #[serde(default)]
    pub interior_gaps: InteriorGapPolicy,
}

fn default_gateway_timeout_ms() -> u64 {
    2500
}

fn default_events_table() -> String {
    "events".to_string()
}

fn default_store_timeout_secs() -> u64 {
    5
}

fn default_batch_size() -> u32 {
    DEFAULT_BATCH_SIZE
}

fn default_max_interior_gaps() -> usize {
    DEFAULT_MAX_INTERIOR_GAPS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            events_table: default_events_table(),
            log_table: None,
            timeout_secs: default_store_timeout_secs(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_interior_gaps: default_max_interior_gaps(),
            interior_gaps: InteriorGapPolicy::default(),
        }
    }
}

impl MirrorConfig {
    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        let cfg: MirrorConfig = serde_json::from_value(loaded.config_json.clone())
            .context("CONFIG_INVALID: config does not match the mirror schema")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.controllers.is_empty() {
            bail!("CONFIG_INVALID: controllers must list at least one controller");
        }
        let mut seen = BTreeSet::new();
        for &c in &self.controllers {
            if c == 0 {
                bail!("CONFIG_INVALID: controller id 0 is not a valid serial number");
            }
            if !seen.insert(c) {
                bail!("CONFIG_INVALID: controller {c} listed more than once");
            }
        }

        let url = self.gateway.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("CONFIG_INVALID: gateway.base_url must be an http(s) URL");
        }
        if self.gateway.timeout_ms == 0 {
            bail!("CONFIG_INVALID: gateway.timeout_ms must be > 0");
        }
        if self.store.timeout_secs == 0 {
            bail!("CONFIG_INVALID: store.timeout_secs must be > 0");
        }
        if self.reconcile.batch_size == 0 {
            bail!("CONFIG_INVALID: reconcile.batch_size must be >= 1");
        }
        Ok(())
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            batch_size: self.reconcile.batch_size,
            interior: self.reconcile.interior_gaps,
        }
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway.timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store.timeout_secs)
    }
}
