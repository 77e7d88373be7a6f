//! Health monitor configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Relative weight of each health score term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub success: f64,
    pub response: f64,
    pub load: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            success: 0.5,
            response: 0.2,
            load: 0.3,
        }
    }
}

/// Health monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default)]
    pub weights: ScoreWeights,
    /// Average response time at which the response term bottoms out.
    #[serde(default = "default_response_time_ceiling_ms")]
    pub response_time_ceiling_ms: u64,
    /// Number of recent outcomes feeding the success rate.
    #[serde(default = "default_window")]
    pub outcome_window: usize,
    /// Number of recent response times feeding the average.
    #[serde(default = "default_window")]
    pub response_window: usize,
    #[serde(default = "default_max_recent_errors")]
    pub max_recent_errors: usize,
    /// Staleness after which an agent reads as offline.
    #[serde(default = "default_offline_threshold")]
    pub offline_threshold_secs: u64,
    /// Status sweep interval.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Staleness after which the sweep purges a record entirely.
    #[serde(default = "default_record_retention")]
    pub record_retention_secs: u64,
    /// Age after which the sweep forgets an unfinished task.
    #[serde(default = "default_in_flight_timeout")]
    pub in_flight_timeout_secs: u64,
}

fn default_response_time_ceiling_ms() -> u64 {
    30_000
}

fn default_window() -> usize {
    20
}

fn default_max_recent_errors() -> usize {
    10
}

fn default_offline_threshold() -> u64 {
    90
}

fn default_check_interval() -> u64 {
    30
}

fn default_record_retention() -> u64 {
    3600
}

fn default_in_flight_timeout() -> u64 {
    900
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            response_time_ceiling_ms: default_response_time_ceiling_ms(),
            outcome_window: default_window(),
            response_window: default_window(),
            max_recent_errors: default_max_recent_errors(),
            offline_threshold_secs: default_offline_threshold(),
            check_interval_secs: default_check_interval(),
            record_retention_secs: default_record_retention(),
            in_flight_timeout_secs: default_in_flight_timeout(),
        }
    }
}

impl HealthConfig {
    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_response_time_ceiling_ms(mut self, ceiling: u64) -> Self {
        self.response_time_ceiling_ms = ceiling;
        self
    }

    pub fn with_offline_threshold_secs(mut self, secs: u64) -> Self {
        self.offline_threshold_secs = secs;
        self
    }

    pub fn with_check_interval_secs(mut self, secs: u64) -> Self {
        self.check_interval_secs = secs;
        self
    }

    pub fn with_record_retention_secs(mut self, secs: u64) -> Self {
        self.record_retention_secs = secs;
        self
    }

    pub fn with_in_flight_timeout_secs(mut self, secs: u64) -> Self {
        self.in_flight_timeout_secs = secs;
        self
    }

    pub fn offline_threshold(&self) -> Duration {
        Duration::from_secs(self.offline_threshold_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn record_retention(&self) -> Duration {
        Duration::from_secs(self.record_retention_secs)
    }

    pub fn in_flight_timeout(&self) -> Duration {
        Duration::from_secs(self.in_flight_timeout_secs)
    }

    /// Check that the weights and windows make sense.
    pub fn validate(&self) -> Result<(), String> {
        let w = &self.weights;
        if [w.success, w.response, w.load].iter().any(|v| *v < 0.0) {
            return Err("health score weights must be non-negative".to_string());
        }
        if w.success + w.response + w.load <= 0.0 {
            return Err("health score weights must not all be zero".to_string());
        }
        if self.outcome_window == 0 || self.response_window == 0 {
            return Err("health windows must hold at least one entry".to_string());
        }
        if self.record_retention_secs < self.offline_threshold_secs {
            return Err("record_retention_secs must not be shorter than the offline threshold".to_string());
        }
        if self.in_flight_timeout_secs == 0 {
            return Err("in_flight_timeout_secs must be positive".to_string());
        }
        Ok(())
    }
}
