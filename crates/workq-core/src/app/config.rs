//! WorkQueueConfig - ドレイン間隔と channel 容量の設定
//!
//! 読み込み元: `Default` / JSON / 環境変数（`WORKQ_*`）

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_DRAIN_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

const ENV_DRAIN_INTERVAL_MS: &str = "WORKQ_DRAIN_INTERVAL_MS";
const ENV_CHANNEL_CAPACITY: &str = "WORKQ_CHANNEL_CAPACITY";
const ENV_FORWARD_COMPLETION: &str = "WORKQ_FORWARD_COMPLETION";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkQueueConfig {
    /// Time between two ticks of each timer loop.
    pub drain_interval_ms: u64,

    /// Capacity of the submission channel. Senders wait once it is full.
    pub channel_capacity: usize,

    /// Carry a submission's completion callback into its queued entry.
    pub forward_completion_callbacks: bool,
}

impl Default for WorkQueueConfig {
    fn default() -> Self {
        Self {
            drain_interval_ms: DEFAULT_DRAIN_INTERVAL_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            forward_completion_callbacks: true,
        }
    }
}

impl WorkQueueConfig {
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Defaults overridden by whichever `WORKQ_*` variables are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_DRAIN_INTERVAL_MS) {
            config.drain_interval_ms = parse(ENV_DRAIN_INTERVAL_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CHANNEL_CAPACITY) {
            config.channel_capacity = parse(ENV_CHANNEL_CAPACITY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_FORWARD_COMPLETION) {
            config.forward_completion_callbacks = parse(ENV_FORWARD_COMPLETION, &raw)?;
        }

        Ok(config)
    }
}

fn parse<V: std::str::FromStr>(key: &'static str, raw: &str) -> Result<V, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key,
        value: raw.to_string(),
    })
}
