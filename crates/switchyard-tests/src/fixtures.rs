//! Test fixtures for agents, configuration and invokers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Mutex;
use switchyard_core::agent::AgentRegistration;
use switchyard_core::health::HealthRecord;
use switchyard_core::ids::{AgentId, TaskId};
use switchyard_core::ports::{CoordinationStore, load_json, save_json};
use switchyard_core::{Error, Result, keys};
use switchyard_orchestrator::{AgentInvoker, CoordinatorConfig, TaskInvocation};
use switchyard_router::{BreakerConfig, RouterConfig};

/// Coordination settings with short backoff and a reproducible random
/// strategy.
pub fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        router: RouterConfig::default()
            .with_backoff_ms(1, 10)
            .with_random_seed(42),
        ..Default::default()
    }
}

/// Like [`fast_config`] with a breaker that trips after `threshold`
/// failures and admits a probe immediately after tripping.
pub fn eager_breaker_config(threshold: u32) -> CoordinatorConfig {
    let mut config = fast_config();
    config.router = config.router.with_breaker(
        BreakerConfig::default()
            .with_failure_threshold(threshold)
            .with_cooldown_secs(0),
    );
    config
}

/// Rewrite the recorded start time of an in-flight task.
pub async fn backdate_in_flight(
    store: &dyn CoordinationStore,
    agent_id: &AgentId,
    task_id: TaskId,
    started: DateTime<Utc>,
) -> Result<()> {
    let key = keys::health(agent_id);
    let mut record = load_json::<HealthRecord>(store, &key)
        .await?
        .ok_or_else(|| Error::AgentNotFound(agent_id.to_string()))?;
    record.in_flight.insert(task_id, started);
    save_json(store, &key, &record).await
}

/// Factory for agent registrations.
pub struct AgentFixture;

impl AgentFixture {
    /// A `code` agent with the `code` capability.
    pub fn coder(id: &str, priority: i32, capacity: u32) -> AgentRegistration {
        AgentRegistration::new(id, "code")
            .with_capabilities(["code"])
            .with_priority(priority)
            .with_max_concurrent_tasks(capacity)
    }

    /// A `review` agent that can also write code.
    pub fn reviewer(id: &str) -> AgentRegistration {
        AgentRegistration::new(id, "review")
            .with_capabilities(["code", "review"])
            .with_tags(["careful"])
            .with_max_concurrent_tasks(2)
    }
}

/// Rewrite an agent's health and discovery timestamps as if it was last
/// heard from at `last_seen`.
pub async fn backdate_agent(
    store: &dyn CoordinationStore,
    agent_id: &AgentId,
    last_seen: DateTime<Utc>,
) -> Result<()> {
    let health_key = keys::health(agent_id);
    if let Some(mut record) = load_json::<HealthRecord>(store, &health_key).await? {
        record.last_seen = last_seen;
        record.last_heartbeat = Some(last_seen);
        save_json(store, &health_key, &record).await?;
    }

    let agent_key = keys::agent(agent_id);
    if let Some(mut record) =
        load_json::<switchyard_core::agent::AgentRecord>(store, &agent_key).await?
    {
        record.last_seen = last_seen;
        save_json(store, &agent_key, &record).await?;
    }
    Ok(())
}

/// Invoker that fails on a fixed set of agents and records every call.
#[derive(Default)]
pub struct ScriptedInvoker {
    failing: Mutex<HashSet<AgentId>>,
    calls: Mutex<Vec<(AgentId, TaskId)>>,
}

impl ScriptedInvoker {
    pub fn failing_on(agents: &[&str]) -> Self {
        let invoker = Self::default();
        for agent in agents {
            invoker.set_failing(agent, true);
        }
        invoker
    }

    pub fn set_failing(&self, agent: &str, failing: bool) {
        let mut set = self.failing.lock().unwrap_or_else(|e| e.into_inner());
        if failing {
            set.insert(AgentId::from(agent));
        } else {
            set.remove(&AgentId::from(agent));
        }
    }

    /// Agents that received a task, in call order.
    pub fn handled_by(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(agent, _)| agent.to_string())
            .collect()
    }
}

#[async_trait]
impl AgentInvoker for ScriptedInvoker {
    async fn invoke(&self, agent_id: &AgentId, task: &TaskInvocation) -> Result<serde_json::Value> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((agent_id.clone(), task.task_id));

        let failing = self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(agent_id);
        if failing {
            return Err(Error::Invocation(format!("{} rejected {}", agent_id, task.task_type)));
        }
        Ok(serde_json::json!({ "agent": agent_id.as_str() }))
    }
}
