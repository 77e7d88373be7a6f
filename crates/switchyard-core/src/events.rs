//! Observability events published by the coordination layer.
//!
//! The coordination layer never consumes these itself; they exist for
//! dashboards, audit logs and other downstream tooling.

use crate::health::HealthStatus;
use crate::ids::{AgentId, TaskId};
use crate::routing::{BreakerState, RoutingStrategy};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// All events in the Switchyard system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum Event {
    // Health
    HealthRegistered(HealthRegisteredPayload),
    Heartbeat(HeartbeatPayload),
    HealthStatusChanged(HealthStatusChangedPayload),
    TaskStarted(TaskStartedPayload),
    TaskCompleted(TaskCompletedPayload),
    AgentOverloaded(AgentOverloadedPayload),
    AgentError(AgentErrorPayload),

    // Discovery
    AgentRegistered(AgentRegisteredPayload),
    AgentDeregistered(AgentDeregisteredPayload),
    AgentExpired(AgentExpiredPayload),

    // Routing
    RoutingDecision(RoutingDecisionPayload),
    RoutingFailed(RoutingFailedPayload),
    BreakerStateChanged(BreakerStateChangedPayload),
}

impl Event {
    /// Returns the bus subject for this event.
    pub fn subject(&self) -> String {
        match self {
            Event::HealthRegistered(p) => format!("health.{}.registered", token(&p.agent_id)),
            Event::Heartbeat(p) => format!("health.{}.heartbeat", token(&p.agent_id)),
            Event::HealthStatusChanged(p) => format!("health.{}.status", token(&p.agent_id)),
            Event::TaskStarted(p) => format!("health.{}.task_started", token(&p.agent_id)),
            Event::TaskCompleted(p) => format!("health.{}.task_completed", token(&p.agent_id)),
            Event::AgentOverloaded(p) => format!("health.{}.overload", token(&p.agent_id)),
            Event::AgentError(p) => format!("health.{}.error", token(&p.agent_id)),
            Event::AgentRegistered(p) => format!("discovery.registered.{}", token(&p.agent_id)),
            Event::AgentDeregistered(p) => {
                format!("discovery.deregistered.{}", token(&p.agent_id))
            }
            Event::AgentExpired(p) => format!("discovery.expired.{}", token(&p.agent_id)),
            Event::RoutingDecision(p) => {
                format!("routing.decision.{}", sanitize_token(&p.task_type))
            }
            Event::RoutingFailed(p) => format!("routing.failed.{}", sanitize_token(&p.task_type)),
            Event::BreakerStateChanged(p) => format!("routing.breaker.{}", token(&p.agent_id)),
        }
    }

    /// The agent the event is about, if any.
    pub fn agent_id(&self) -> Option<&AgentId> {
        match self {
            Event::HealthRegistered(p) => Some(&p.agent_id),
            Event::Heartbeat(p) => Some(&p.agent_id),
            Event::HealthStatusChanged(p) => Some(&p.agent_id),
            Event::TaskStarted(p) => Some(&p.agent_id),
            Event::TaskCompleted(p) => Some(&p.agent_id),
            Event::AgentOverloaded(p) => Some(&p.agent_id),
            Event::AgentError(p) => Some(&p.agent_id),
            Event::AgentRegistered(p) => Some(&p.agent_id),
            Event::AgentDeregistered(p) => Some(&p.agent_id),
            Event::AgentExpired(p) => Some(&p.agent_id),
            Event::RoutingDecision(p) => Some(&p.agent_id),
            Event::RoutingFailed(_) => None,
            Event::BreakerStateChanged(p) => Some(&p.agent_id),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::HealthRegistered(p) => p.timestamp,
            Event::Heartbeat(p) => p.timestamp,
            Event::HealthStatusChanged(p) => p.timestamp,
            Event::TaskStarted(p) => p.timestamp,
            Event::TaskCompleted(p) => p.timestamp,
            Event::AgentOverloaded(p) => p.timestamp,
            Event::AgentError(p) => p.timestamp,
            Event::AgentRegistered(p) => p.timestamp,
            Event::AgentDeregistered(p) => p.timestamp,
            Event::AgentExpired(p) => p.timestamp,
            Event::RoutingDecision(p) => p.timestamp,
            Event::RoutingFailed(p) => p.timestamp,
            Event::BreakerStateChanged(p) => p.timestamp,
        }
    }
}

fn token(agent_id: &AgentId) -> String {
    sanitize_token(agent_id.as_str())
}

/// Make a string safe to use as a single subject token.
pub fn sanitize_token(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' | ' ' | '\t' => '_',
            _ => c,
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Match a subject against a pattern. `*` matches exactly one token and a
/// trailing `>` matches one or more remaining tokens.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return pattern_tokens.next().is_none(),
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

// === Health Payloads ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HealthRegisteredPayload {
    pub agent_id: AgentId,
    pub agent_type: String,
    pub max_concurrent_tasks: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HeartbeatPayload {
    pub agent_id: AgentId,
    pub status: HealthStatus,
    pub current_load: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HealthStatusChangedPayload {
    pub agent_id: AgentId,
    pub previous: HealthStatus,
    pub current: HealthStatus,
    pub health_score: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskStartedPayload {
    pub agent_id: AgentId,
    pub task_id: TaskId,
    pub current_load: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskCompletedPayload {
    pub agent_id: AgentId,
    pub task_id: TaskId,
    pub success: bool,
    pub duration_ms: Option<u64>,
    pub health_score: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AgentOverloadedPayload {
    pub agent_id: AgentId,
    pub task_id: TaskId,
    pub current_load: u32,
    pub max_concurrent_tasks: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AgentErrorPayload {
    pub agent_id: AgentId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

// === Discovery Payloads ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AgentRegisteredPayload {
    pub agent_id: AgentId,
    pub agent_type: String,
    pub capabilities: Vec<String>,
    pub version: String,
    /// True when an existing registration was overwritten.
    pub replaced: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AgentDeregisteredPayload {
    pub agent_id: AgentId,
    pub agent_type: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AgentExpiredPayload {
    pub agent_id: AgentId,
    pub last_seen: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

// === Routing Payloads ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RoutingDecisionPayload {
    pub task_id: TaskId,
    pub task_type: String,
    pub agent_id: AgentId,
    pub strategy: RoutingStrategy,
    pub candidates: u32,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RoutingFailedPayload {
    pub task_id: TaskId,
    pub task_type: String,
    pub strategy: RoutingStrategy,
    pub attempts: u32,
    pub error_message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BreakerStateChangedPayload {
    pub agent_id: AgentId,
    pub previous: BreakerState,
    pub current: BreakerState,
    pub failure_count: u32,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_subject_wildcards() {
        assert!(subject_matches("health.>", "health.a.heartbeat"));
        assert!(subject_matches("health.*.heartbeat", "health.a.heartbeat"));
        assert!(!subject_matches("health.*.heartbeat", "health.a.status"));
        assert!(!subject_matches("health.>", "health"));
        assert!(subject_matches(">", "routing.decision.code"));
        assert!(!subject_matches("routing.decision", "routing.decision.code"));
    }

    #[test]
    fn test_subject_sanitizes_agent_id() {
        let event = Event::Heartbeat(HeartbeatPayload {
            agent_id: AgentId::from("code.agent 1"),
            status: HealthStatus::Healthy,
            current_load: 0,
            timestamp: Utc::now(),
        });
        assert_eq!(event.subject(), "health.code_agent_1.heartbeat");
    }

    #[test]
    fn test_event_json_carries_event_type() {
        let event = Event::AgentDeregistered(AgentDeregisteredPayload {
            agent_id: AgentId::from("a"),
            agent_type: "code".to_string(),
            timestamp: Utc::now(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], "agent_deregistered");
        assert_eq!(value["agent_id"], "a");

        let parsed: Event = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, event);
    }
}
