//! Per-worker-type configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings attached to one registered worker type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Whether `debug`-level update posts are written for this type.
    #[serde(default)]
    pub enable_debug_updates: bool,

    /// Whether `trace`-level update posts are written for this type.
    #[serde(default)]
    pub enable_trace_updates: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            enable_debug_updates: false,
            enable_trace_updates: false,
        }
    }
}

impl WorkerConfig {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout_ms: timeout.as_millis() as u64,
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    60_000
}
