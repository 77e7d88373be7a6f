//! Seam to the agent execution pipeline.

use crate::task::TaskInvocation;
use async_trait::async_trait;
use switchyard_core::Result;
use switchyard_core::ids::AgentId;

/// Runs a routed task on an agent and returns its output.
///
/// An `Err` is treated as a task failure attributed to the agent: it counts
/// against the agent's health and circuit breaker.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, agent_id: &AgentId, task: &TaskInvocation) -> Result<serde_json::Value>;
}
