//! Simulation configuration file.

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;
use switchyard_core::agent::AgentRegistration;
use switchyard_core::routing::RoutingStrategy;
use switchyard_nats::NatsConfig;
use switchyard_orchestrator::{CoordinatorConfig, OrchestratorConfig, TaskSpec};

/// Everything a simulation run needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchyardConfig {
    #[serde(flatten)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Publish events to JetStream instead of the in-process log.
    #[serde(default)]
    pub nats: Option<NatsConfig>,
    #[serde(default = "default_agents")]
    pub agents: Vec<SimulatedAgent>,
    #[serde(default = "default_workload")]
    pub workload: Vec<WorkloadEntry>,
}

/// An agent hosted by the simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedAgent {
    #[serde(flatten)]
    pub registration: AgentRegistration,
    /// Probability in `[0, 1]` that a task fails on this agent.
    #[serde(default)]
    pub failure_rate: f64,
    /// Simulated task duration.
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
}

/// One kind of task in the generated workload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadEntry {
    pub task_type: String,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub preferred_tags: Vec<String>,
    #[serde(default)]
    pub strategy: Option<RoutingStrategy>,
    #[serde(default)]
    pub priority: i32,
    /// Relative share of generated tasks.
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_latency_ms() -> u64 {
    5
}

fn default_weight() -> u32 {
    1
}

fn default_agents() -> Vec<SimulatedAgent> {
    vec![
        SimulatedAgent {
            registration: AgentRegistration::new("coder-a", "code")
                .with_capabilities(["code", "review"])
                .with_tags(["fast"])
                .with_priority(10)
                .with_max_concurrent_tasks(4),
            failure_rate: 0.05,
            latency_ms: default_latency_ms(),
        },
        SimulatedAgent {
            registration: AgentRegistration::new("coder-b", "code")
                .with_capabilities(["code"])
                .with_priority(5)
                .with_max_concurrent_tasks(2),
            failure_rate: 0.3,
            latency_ms: default_latency_ms(),
        },
    ]
}

fn default_workload() -> Vec<WorkloadEntry> {
    vec![WorkloadEntry {
        task_type: "code".to_string(),
        required_capabilities: vec!["code".to_string()],
        preferred_tags: Vec::new(),
        strategy: None,
        priority: 0,
        weight: 1,
    }]
}

impl Default for SwitchyardConfig {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            nats: None,
            agents: default_agents(),
            workload: default_workload(),
        }
    }
}

impl SwitchyardConfig {
    /// Load from a YAML file; a missing path yields the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Reject settings the components would misbehave with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Err(reason) = self.coordinator.health.validate() {
            bail!("health: {}", reason);
        }
        if !(0.0..=1.0).contains(&self.coordinator.router.min_health_score) {
            bail!("router: min_health_score must be within [0, 1]");
        }
        if self.coordinator.router.breaker.failure_threshold == 0 {
            bail!("router: breaker failure_threshold must be at least 1");
        }
        if self.agents.is_empty() {
            bail!("at least one agent is required");
        }
        for agent in &self.agents {
            agent
                .registration
                .validate()
                .with_context(|| format!("agent {}", agent.registration.agent_id))?;
            if !(0.0..=1.0).contains(&agent.failure_rate) {
                bail!(
                    "agent {}: failure_rate must be within [0, 1]",
                    agent.registration.agent_id
                );
            }
        }
        if self.workload.iter().all(|w| w.weight == 0) {
            bail!("workload needs at least one entry with non-zero weight");
        }
        for entry in &self.workload {
            if entry.required_capabilities.is_empty() {
                bail!(
                    "workload {}: required_capabilities must not be empty",
                    entry.task_type
                );
            }
        }
        Ok(())
    }
}

impl WorkloadEntry {
    pub fn task_spec(&self) -> TaskSpec {
        let mut spec = TaskSpec::new(self.task_type.clone())
            .with_capabilities(self.required_capabilities.iter().cloned())
            .with_preferred_tags(self.preferred_tags.iter().cloned())
            .with_priority(self.priority);
        if let Some(strategy) = self.strategy {
            spec = spec.with_strategy(strategy);
        }
        spec
    }
}
