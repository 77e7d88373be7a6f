//! The coordination layer as one handle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use switchyard_core::Result;
use switchyard_core::agent::{AgentRecord, AgentRegistration};
use switchyard_core::health::HealthRecord;
use switchyard_core::ids::{AgentId, TaskId};
use switchyard_core::ports::{CoordinationStore, EventBus};
use switchyard_core::routing::{RoutingRequest, RoutingResult};
use switchyard_discovery::{DiscoveryConfig, DiscoveryService};
use switchyard_health::{HealthConfig, HealthMonitor};
use switchyard_router::{Router, RouterConfig};
use tracing::info;

/// Settings for all three coordination components.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub router: RouterConfig,
}

/// Health monitor, discovery service and router wired to one store and one
/// event bus.
///
/// Nothing runs until [`Coordinator::init`]; [`Coordinator::close`] stops
/// the background sweeps and flushes pending events.
pub struct Coordinator {
    health: Arc<HealthMonitor>,
    discovery: Arc<DiscoveryService>,
    router: Arc<Router>,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        bus: Arc<dyn EventBus>,
        config: CoordinatorConfig,
    ) -> Self {
        let health = Arc::new(HealthMonitor::new(
            store.clone(),
            bus.clone(),
            config.health,
        ));
        let discovery = Arc::new(DiscoveryService::new(
            store.clone(),
            bus.clone(),
            health.clone(),
            config.discovery,
        ));
        let router = Arc::new(Router::new(
            store,
            bus,
            discovery.clone(),
            health.clone(),
            config.router,
        ));
        Self {
            health,
            discovery,
            router,
        }
    }

    pub fn init(&self) {
        self.health.init();
        self.discovery.init();
        self.router.init();
        info!("Coordination layer started");
    }

    pub async fn close(&self) {
        self.router.close().await;
        self.discovery.close().await;
        self.health.close().await;
        info!("Coordination layer stopped");
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn discovery(&self) -> &Arc<DiscoveryService> {
        &self.discovery
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub async fn register_agent(&self, registration: AgentRegistration) -> Result<AgentRecord> {
        self.discovery.register_agent(registration).await
    }

    pub async fn deregister_agent(&self, agent_id: &AgentId) -> Result<AgentRecord> {
        self.discovery.deregister_agent(agent_id).await
    }

    /// Heartbeat into both health and the discovery record.
    pub async fn record_heartbeat(&self, agent_id: &AgentId) -> Result<()> {
        self.health.record_heartbeat(agent_id).await?;
        self.discovery.touch(agent_id).await
    }

    pub async fn record_task_start(&self, agent_id: &AgentId, task_id: TaskId) -> Result<()> {
        self.health.record_task_start(agent_id, task_id).await
    }

    /// Report a finished task to health and to the agent's breaker.
    ///
    /// Completions health does not count (not in flight, unknown agent) are
    /// kept away from the breaker too. A health write failure does not stop
    /// the breaker from seeing the outcome, so a claimed probe is released.
    pub async fn record_task_completion(
        &self,
        agent_id: &AgentId,
        task_id: TaskId,
        success: bool,
    ) -> Result<()> {
        let counted = self
            .health
            .record_task_completion(agent_id, task_id, success)
            .await;
        if matches!(counted, Ok(false)) {
            return Ok(());
        }
        let breaker = self.router.record_outcome(agent_id, success).await;
        counted?;
        breaker?;
        Ok(())
    }

    pub async fn route_with_retry(&self, request: &RoutingRequest) -> Result<RoutingResult> {
        self.router.route_with_retry(request).await
    }

    pub async fn get_agent_health(&self, agent_id: &AgentId) -> Result<HealthRecord> {
        self.health.get_agent_health(agent_id).await
    }

    pub async fn find_agents_by_capability(
        &self,
        required_capabilities: &BTreeSet<String>,
        preferred_tags: &BTreeSet<String>,
    ) -> Result<Vec<AgentId>> {
        self.discovery
            .find_agents_by_capability(required_capabilities, preferred_tags)
            .await
    }
}
