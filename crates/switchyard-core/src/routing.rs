//! Routing request and result values.

use crate::ids::{AgentId, TaskId};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    RoundRobin,
    LeastLoaded,
    WeightedRandom,
    #[default]
    HealthAware,
    PriorityBased,
}

impl RoutingStrategy {
    pub const ALL: [RoutingStrategy; 5] = [
        RoutingStrategy::RoundRobin,
        RoutingStrategy::LeastLoaded,
        RoutingStrategy::WeightedRandom,
        RoutingStrategy::HealthAware,
        RoutingStrategy::PriorityBased,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingStrategy::RoundRobin => "round_robin",
            RoutingStrategy::LeastLoaded => "least_loaded",
            RoutingStrategy::WeightedRandom => "weighted_random",
            RoutingStrategy::HealthAware => "health_aware",
            RoutingStrategy::PriorityBased => "priority_based",
        }
    }
}

impl std::fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RoutingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoutingStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| format!("Unknown routing strategy: {}", s))
    }
}

/// Circuit breaker position for one agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

/// A request to pick one agent for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRequest {
    pub task_id: TaskId,
    pub task_type: String,
    #[serde(default)]
    pub priority: i32,
    /// Every capability must be present on the chosen agent.
    #[serde(default)]
    pub required_capabilities: BTreeSet<String>,
    /// Soft boost for agents carrying these tags.
    #[serde(default)]
    pub preferred_tags: BTreeSet<String>,
    /// Restrict candidates to one agent type. Enough on its own when no
    /// capability is required.
    #[serde(default)]
    pub agent_type: Option<String>,
    /// Overrides the router's default strategy.
    #[serde(default)]
    pub strategy: Option<RoutingStrategy>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_seconds() -> u64 {
    30
}

impl RoutingRequest {
    pub fn new(task_id: TaskId, task_type: impl Into<String>) -> Self {
        Self {
            task_id,
            task_type: task_type.into(),
            priority: 0,
            required_capabilities: BTreeSet::new(),
            preferred_tags: BTreeSet::new(),
            agent_type: None,
            strategy: None,
            max_retries: default_max_retries(),
            timeout_seconds: default_timeout_seconds(),
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_preferred_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = Some(agent_type.into());
        self
    }

    pub fn with_strategy(mut self, strategy: RoutingStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Outcome of a routing decision.
///
/// `agent_id` is set exactly when `success` is true and `error_message`
/// exactly when it is false; use [`RoutingResult::routed`] and
/// [`RoutingResult::failed`] to build one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RoutingResult {
    pub task_id: TaskId,
    pub success: bool,
    pub agent_id: Option<AgentId>,
    pub routing_strategy: RoutingStrategy,
    pub error_message: Option<String>,
    pub attempts: u32,
    pub latency_ms: u64,
}

impl RoutingResult {
    pub fn routed(task_id: TaskId, agent_id: AgentId, strategy: RoutingStrategy) -> Self {
        Self {
            task_id,
            success: true,
            agent_id: Some(agent_id),
            routing_strategy: strategy,
            error_message: None,
            attempts: 1,
            latency_ms: 0,
        }
    }

    pub fn failed(task_id: TaskId, strategy: RoutingStrategy, message: impl Into<String>) -> Self {
        Self {
            task_id,
            success: false,
            agent_id: None,
            routing_strategy: strategy,
            error_message: Some(message.into()),
            attempts: 1,
            latency_ms: 0,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}
