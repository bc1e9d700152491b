//! Recognition Engine
//!
//! Proportional contribution recognition across a network of peer hierarchies:
//! - Weighted trees where every node holds a recursive share of its parent's allocation
//! - Fulfillment derived from concrete contributions, with manual overrides
//! - Mutual recognition capped by the weaker of the two directions
//! - Multi-hop social distribution across peers' published distributions
//! - A reactive layer (memoization, dependency tracking, debounced publishing)
//!   that keeps derived values fresh over an eventually consistent store

pub mod error;
pub mod events;
pub mod hierarchy;
pub mod network;
pub mod reactive;
pub mod recognition;
pub mod store;
pub mod tree;

pub use error::{RecognitionError, Result};

use reactive::{CacheConfig, SchedulerConfig};
use recognition::TraversalConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "recognition.yaml";

/// Shape of `recognition.yaml`. Every section and field is optional.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub store: StoreYamlConfig,
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
    pub traversal: TraversalConfig,
}

/// `store:` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreYamlConfig {
    pub read_timeout_ms: u64,
}

impl Default for StoreYamlConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 5_000,
        }
    }
}

/// Resolved configuration shared by every hierarchy of a process
#[derive(Debug, Clone)]
pub struct Config {
    /// Bound on every store read
    pub read_timeout: Duration,
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
    pub traversal: TraversalConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_yaml(YamlConfig::default())
    }
}

impl Config {
    /// Resolve the configuration: `RECOGNITION_*` env vars win over the YAML
    /// file, which wins over defaults. Without `yaml_path`, `./recognition.yaml`
    /// is used when present.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> anyhow::Result<Self> {
        let mut yaml = Self::load_yaml(yaml_path);

        if let Some(ms) = env_u64("RECOGNITION_READ_TIMEOUT_MS") {
            yaml.store.read_timeout_ms = ms;
        }
        if let Some(ms) = env_u64("RECOGNITION_DEBOUNCE_MS") {
            yaml.scheduler.debounce_ms = ms;
        }
        if let Some(ms) = env_u64("RECOGNITION_COOLDOWN_MS") {
            yaml.scheduler.cooldown_ms = ms;
        }
        if let Some(depth) = env_u64("RECOGNITION_MAX_DEPTH") {
            yaml.traversal.max_depth = depth as usize;
        }

        let min_share = yaml.traversal.min_share;
        if min_share.is_nan() || min_share < 0.0 {
            anyhow::bail!(
                "traversal.min_share must be non-negative, got {}",
                min_share
            );
        }

        Ok(Self::from_yaml(yaml))
    }

    fn from_yaml(yaml: YamlConfig) -> Self {
        Self {
            read_timeout: Duration::from_millis(yaml.store.read_timeout_ms),
            cache: yaml.cache,
            scheduler: yaml.scheduler,
            traversal: yaml.traversal,
        }
    }

    /// Missing or unparsable files yield the defaults.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let path = yaml_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let Ok(raw) = std::fs::read_to_string(path) else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return YamlConfig::default();
        };
        serde_yaml::from_str(&raw)
            .inspect(|_| tracing::info!(path = %path.display(), "Config loaded"))
            .unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Invalid config file, using defaults");
                YamlConfig::default()
            })
    }
}

fn env_u64(var: &str) -> Option<u64> {
    let raw = std::env::var(var).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring {}={}: not an unsigned integer", var, raw);
            None
        }
    }
}
