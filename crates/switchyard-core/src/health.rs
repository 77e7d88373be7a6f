//! Health record types.

use crate::ids::{AgentId, TaskId};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Offline,
    Initializing,
}

impl HealthStatus {
    /// Whether the router may send work to an agent in this status.
    pub fn is_routable(&self) -> bool {
        !matches!(self, HealthStatus::Offline)
    }

    /// Whether discovery's best-agent lookup accepts this status.
    pub fn is_available(&self) -> bool {
        !matches!(self, HealthStatus::Offline | HealthStatus::Unhealthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Offline => "offline",
            HealthStatus::Initializing => "initializing",
        };
        f.write_str(s)
    }
}

/// Per-agent health bookkeeping, written only by the health monitor.
///
/// `status` is derived from `health_score` and `last_seen` staleness every
/// time a snapshot is handed out; the stored value is only the status last
/// announced on the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub agent_id: AgentId,
    pub agent_type: String,
    pub status: HealthStatus,
    pub health_score: f64,
    pub current_load: u32,
    pub max_concurrent_tasks: u32,
    pub success_count: u64,
    pub failure_count: u64,
    /// Rolling window of task outcomes, newest last.
    #[serde(default)]
    pub recent_outcomes: VecDeque<bool>,
    /// Rolling window of task durations in milliseconds, newest last.
    #[serde(default)]
    pub recent_response_ms: VecDeque<u64>,
    #[serde(default)]
    pub in_flight: BTreeMap<TaskId, DateTime<Utc>>,
    #[serde(default)]
    pub recent_errors: VecDeque<String>,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_seen: DateTime<Utc>,
}

impl HealthRecord {
    pub fn new(agent_id: AgentId, agent_type: String, now: DateTime<Utc>) -> Self {
        Self {
            agent_id,
            agent_type,
            status: HealthStatus::Initializing,
            health_score: 1.0,
            current_load: 0,
            max_concurrent_tasks: 1,
            success_count: 0,
            failure_count: 0,
            recent_outcomes: VecDeque::new(),
            recent_response_ms: VecDeque::new(),
            in_flight: BTreeMap::new(),
            recent_errors: VecDeque::new(),
            registered_at: now,
            last_heartbeat: None,
            last_seen: now,
        }
    }

    /// Success ratio over the rolling outcome window; 1.0 with no history.
    pub fn success_rate(&self) -> f64 {
        if self.recent_outcomes.is_empty() {
            return 1.0;
        }
        let ok = self.recent_outcomes.iter().filter(|o| **o).count();
        ok as f64 / self.recent_outcomes.len() as f64
    }

    pub fn average_response_ms(&self) -> Option<f64> {
        if self.recent_response_ms.is_empty() {
            return None;
        }
        let total: u64 = self.recent_response_ms.iter().sum();
        Some(total as f64 / self.recent_response_ms.len() as f64)
    }

    /// `current_load / max_concurrent_tasks`, clamped to [0, 1].
    pub fn load_ratio(&self) -> f64 {
        let max = self.max_concurrent_tasks.max(1) as f64;
        (self.current_load as f64 / max).clamp(0.0, 1.0)
    }

    pub fn has_capacity(&self) -> bool {
        self.current_load < self.max_concurrent_tasks.max(1)
    }

    /// True until the agent has either heartbeated or reported an outcome.
    pub fn is_initializing(&self) -> bool {
        self.last_heartbeat.is_none() && self.success_count == 0 && self.failure_count == 0
    }
}

/// Count of agents per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub offline: usize,
    pub initializing: usize,
}

impl HealthSummary {
    pub fn add(&mut self, status: HealthStatus) {
        self.total += 1;
        match status {
            HealthStatus::Healthy => self.healthy += 1,
            HealthStatus::Degraded => self.degraded += 1,
            HealthStatus::Unhealthy => self.unhealthy += 1,
            HealthStatus::Offline => self.offline += 1,
            HealthStatus::Initializing => self.initializing += 1,
        }
    }
}
