//! Discovery service configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Agents unseen for longer than this are treated as crashed and removed.
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_secs: u64,
    /// Cleanup sweep interval.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_agent_timeout() -> u64 {
    300
}

fn default_cleanup_interval() -> u64 {
    60
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            agent_timeout_secs: default_agent_timeout(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl DiscoveryConfig {
    pub fn with_agent_timeout_secs(mut self, secs: u64) -> Self {
        self.agent_timeout_secs = secs;
        self
    }

    pub fn with_cleanup_interval_secs(mut self, secs: u64) -> Self {
        self.cleanup_interval_secs = secs;
        self
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}
