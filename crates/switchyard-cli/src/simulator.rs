//! Simulated agents and workload.

use crate::config::{SimulatedAgent, WorkloadEntry};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use switchyard_core::ids::AgentId;
use switchyard_core::{Error, Result};
use switchyard_orchestrator::{AgentInvoker, TaskInvocation, TaskSpec};

struct Behaviour {
    failure_rate: f64,
    latency: Duration,
}

/// Invoker that sleeps for each agent's latency and fails at its configured
/// rate.
pub struct SimulatedInvoker {
    agents: HashMap<AgentId, Behaviour>,
    rng: Mutex<StdRng>,
}

impl SimulatedInvoker {
    pub fn new(agents: &[SimulatedAgent], rng: StdRng) -> Self {
        let agents = agents
            .iter()
            .map(|a| {
                (
                    a.registration.agent_id.clone(),
                    Behaviour {
                        failure_rate: a.failure_rate.clamp(0.0, 1.0),
                        latency: Duration::from_millis(a.latency_ms),
                    },
                )
            })
            .collect();
        Self {
            agents,
            rng: Mutex::new(rng),
        }
    }
}

#[async_trait]
impl AgentInvoker for SimulatedInvoker {
    async fn invoke(&self, agent_id: &AgentId, task: &TaskInvocation) -> Result<serde_json::Value> {
        let behaviour = self
            .agents
            .get(agent_id)
            .ok_or_else(|| Error::AgentNotFound(agent_id.to_string()))?;

        tokio::time::sleep(behaviour.latency).await;

        let failed = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            rng.gen_bool(behaviour.failure_rate)
        };
        if failed {
            return Err(Error::Invocation(format!(
                "simulated failure of {} on {}",
                task.task_type, agent_id
            )));
        }
        Ok(serde_json::json!({
            "task_id": task.task_id.to_string(),
            "agent_id": agent_id.as_str(),
        }))
    }
}

/// Draw `count` task specs from the workload, each entry picked in
/// proportion to its weight.
pub fn generate_workload(workload: &[WorkloadEntry], count: usize, rng: &mut StdRng) -> Vec<TaskSpec> {
    let total: u32 = workload.iter().map(|w| w.weight).sum();
    if total == 0 {
        return Vec::new();
    }

    (0..count)
        .filter_map(|_| {
            let mut target = rng.gen_range(0..total);
            workload.iter().find_map(|entry| {
                if target < entry.weight {
                    Some(entry.task_spec())
                } else {
                    target -= entry.weight;
                    None
                }
            })
        })
        .collect()
}

pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
