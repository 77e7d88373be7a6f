//! Task specifications and lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use switchyard_core::ids::{AgentId, TaskId};
use switchyard_core::routing::{RoutingRequest, RoutingResult, RoutingStrategy};

/// Work submitted to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_type: String,
    /// Higher runs first.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub required_capabilities: BTreeSet<String>,
    #[serde(default)]
    pub preferred_tags: BTreeSet<String>,
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub strategy: Option<RoutingStrategy>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Opaque input handed to the agent.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl TaskSpec {
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            priority: 0,
            required_capabilities: BTreeSet::new(),
            preferred_tags: BTreeSet::new(),
            agent_type: None,
            strategy: None,
            max_retries: None,
            timeout_seconds: None,
            payload: serde_json::Value::Null,
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

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_strategy(mut self, strategy: RoutingStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn with_timeout_seconds(mut self, secs: u64) -> Self {
        self.timeout_seconds = Some(secs);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Routing request for this task, filling unset limits from defaults.
    pub fn routing_request(
        &self,
        task_id: TaskId,
        default_max_retries: u32,
        default_timeout_seconds: u64,
    ) -> RoutingRequest {
        let mut request = RoutingRequest::new(task_id, self.task_type.clone())
            .with_priority(self.priority)
            .with_capabilities(self.required_capabilities.iter().cloned())
            .with_preferred_tags(self.preferred_tags.iter().cloned())
            .with_max_retries(self.max_retries.unwrap_or(default_max_retries))
            .with_timeout_seconds(self.timeout_seconds.unwrap_or(default_timeout_seconds));
        if let Some(agent_type) = &self.agent_type {
            request = request.with_agent_type(agent_type.clone());
        }
        if let Some(strategy) = self.strategy {
            request = request.with_strategy(strategy);
        }
        request
    }
}

/// Where a task is in its lifecycle. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running {
        agent_id: AgentId,
    },
    Completed {
        agent_id: AgentId,
        output: serde_json::Value,
    },
    Failed {
        reason: String,
        agent_id: Option<AgentId>,
    },
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed { .. } | TaskState::Failed { .. })
    }
}

/// A submitted task and everything known about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEntry {
    pub task_id: TaskId,
    pub spec: TaskSpec,
    pub state: TaskState,
    /// The most recent routing outcome.
    pub routing: Option<RoutingResult>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// What the agent receives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInvocation {
    pub task_id: TaskId,
    pub task_type: String,
    pub payload: serde_json::Value,
}
