//! Sync and remote store configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Synchronization engine and remote connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between periodic sync cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Milliseconds between `start` and the first cycle
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Failed connection attempts before the counter resets
    #[serde(default = "default_max_connection_attempts")]
    pub max_connection_attempts: u32,

    /// Remote connect / server selection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Idle socket timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Upper bound for a single remote operation in seconds
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
    10
}

fn default_initial_delay_ms() -> u64 {
    2000
}

fn default_max_connection_attempts() -> u32 {
    3
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_idle_timeout_secs() -> u64 {
    45
}

fn default_operation_timeout_secs() -> u64 {
    10
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            initial_delay_ms: default_initial_delay_ms(),
            max_connection_attempts: default_max_connection_attempts(),
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            operation_timeout_secs: default_operation_timeout_secs(),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}
