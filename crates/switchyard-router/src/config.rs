//! Router and circuit breaker configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use switchyard_core::routing::RoutingStrategy;

/// Per-agent circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Failures inside the window that open the breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_failure_window")]
    pub failure_window_secs: u64,
    /// Time an open breaker waits before admitting a probe.
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    /// A probe that never reports back is released after this long.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_failure_window() -> u64 {
    60
}

fn default_cooldown() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    120
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            failure_window_secs: default_failure_window(),
            cooldown_secs: default_cooldown(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

impl BreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_failure_window_secs(mut self, secs: u64) -> Self {
        self.failure_window_secs = secs;
        self
    }

    pub fn with_cooldown_secs(mut self, secs: u64) -> Self {
        self.cooldown_secs = secs;
        self
    }

    pub fn failure_window(&self) -> Duration {
        Duration::from_secs(self.failure_window_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Strategy for requests that do not name one.
    #[serde(default)]
    pub default_strategy: RoutingStrategy,
    /// HEALTH_AWARE ignores agents scoring below this.
    #[serde(default = "default_min_health_score")]
    pub min_health_score: f64,
    /// Skip agents whose in-flight count has reached their capacity.
    #[serde(default = "default_true")]
    pub enforce_capacity: bool,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
    /// Fixed seed for WEIGHTED_RANDOM, for reproducible runs.
    #[serde(default)]
    pub random_seed: Option<u64>,
    #[serde(default)]
    pub breaker: BreakerConfig,
}

fn default_min_health_score() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

fn default_backoff_base() -> u64 {
    100
}

fn default_backoff_max() -> u64 {
    2_000
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_strategy: RoutingStrategy::default(),
            min_health_score: default_min_health_score(),
            enforce_capacity: default_true(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
            random_seed: None,
            breaker: BreakerConfig::default(),
        }
    }
}

impl RouterConfig {
    pub fn with_default_strategy(mut self, strategy: RoutingStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    pub fn with_min_health_score(mut self, score: f64) -> Self {
        self.min_health_score = score;
        self
    }

    pub fn with_enforce_capacity(mut self, enforce: bool) -> Self {
        self.enforce_capacity = enforce;
        self
    }

    pub fn with_backoff_ms(mut self, base: u64, max: u64) -> Self {
        self.backoff_base_ms = base;
        self.backoff_max_ms = max;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    /// Delay before retry number `retry` (1-based), doubling from the base
    /// and capped at the maximum.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(20);
        let ms = self
            .backoff_base_ms
            .saturating_mul(factor)
            .min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }
}
