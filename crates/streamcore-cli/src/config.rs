//! Runner configuration: loaded from YAML with environment variable
//! overrides, the same two-step load pattern as the rest of this stack's
//! server binaries.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Ring capacity for queues whose filter doesn't request a specific
    /// size. Override: `STREAMCORE_QUEUE_CAPACITY`.
    pub queue_capacity: usize,

    /// Retry backoff and rendezvous timeout, in microseconds.
    /// Override: `STREAMCORE_RETRY_MICROS`.
    pub retry_micros: u64,

    /// Frame-time mixing window, in microseconds, for the demo pipeline's
    /// mixing stage. `0` means best-effort. Override:
    /// `STREAMCORE_FRAME_TIME_MICROS`.
    pub frame_time_micros: i64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: streamcore::queue::DEFAULT_CAPACITY,
            retry_micros: streamcore::DEFAULT_RETRY_MICROS,
            frame_time_micros: 0,
        }
    }
}

impl RunnerConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("STREAMCORE_QUEUE_CAPACITY") {
            if let Ok(n) = val.parse() {
                self.queue_capacity = n;
            }
        }
        if let Ok(val) = std::env::var("STREAMCORE_RETRY_MICROS") {
            if let Ok(n) = val.parse() {
                self.retry_micros = n;
            }
        }
        if let Ok(val) = std::env::var("STREAMCORE_FRAME_TIME_MICROS") {
            if let Ok(n) = val.parse() {
                self.frame_time_micros = n;
            }
        }
    }

    pub fn to_core_config(&self) -> streamcore::CoreConfig {
        streamcore::CoreConfig {
            default_queue_capacity: self.queue_capacity,
            retry_micros: self.retry_micros,
        }
    }
}
