//! Orchestrator configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Routing attempts for tasks that do not set their own.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    /// Routing budget for tasks that do not set their own.
    #[serde(default = "default_timeout")]
    pub default_timeout_seconds: u64,
    /// Upper bound on a single agent invocation.
    #[serde(default = "default_invocation_timeout")]
    pub invocation_timeout_secs: u64,
    /// Heartbeat interval for locally hosted agents.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout() -> u64 {
    30
}

fn default_invocation_timeout() -> u64 {
    300
}

fn default_heartbeat_interval() -> u64 {
    10
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_max_retries: default_max_retries(),
            default_timeout_seconds: default_timeout(),
            invocation_timeout_secs: default_invocation_timeout(),
            heartbeat_interval_secs: default_heartbeat_interval(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_default_max_retries(mut self, retries: u32) -> Self {
        self.default_max_retries = retries;
        self
    }

    pub fn with_default_timeout_seconds(mut self, secs: u64) -> Self {
        self.default_timeout_seconds = secs;
        self
    }

    pub fn with_invocation_timeout_secs(mut self, secs: u64) -> Self {
        self.invocation_timeout_secs = secs;
        self
    }

    pub fn with_heartbeat_interval_secs(mut self, secs: u64) -> Self {
        self.heartbeat_interval_secs = secs;
        self
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
}
