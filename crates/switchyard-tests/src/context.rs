//! Test context wiring a coordination layer to a store and event bus.

use crate::containers::NatsContainer;
use std::sync::Arc;
use switchyard_core::Result;
use switchyard_core::agent::{AgentRecord, AgentRegistration};
use switchyard_core::events::Event;
use switchyard_core::ids::AgentId;
use switchyard_nats::{NatsConfig, NatsEventBus};
use switchyard_orchestrator::{Coordinator, CoordinatorConfig};
use switchyard_store::{MemoryEventBus, MemoryStore};

/// In-process coordination layer.
///
/// Background sweeps are not started; tests drive `sweep` and
/// `cleanup_expired` directly.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub bus: Arc<MemoryEventBus>,
    pub coordinator: Arc<Coordinator>,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(crate::fixtures::fast_config()).await
    }

    pub async fn with_config(config: CoordinatorConfig) -> Self {
        crate::init_test_logging();

        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(MemoryEventBus::new());
        let coordinator = Arc::new(Coordinator::new(store.clone(), bus.clone(), config));

        Self {
            store,
            bus,
            coordinator,
        }
    }

    /// Register and heartbeat an agent so it is immediately routable.
    pub async fn add_agent(&self, registration: AgentRegistration) -> Result<AgentRecord> {
        let record = self.coordinator.register_agent(registration).await?;
        self.coordinator.record_heartbeat(&record.agent_id).await?;
        Ok(record)
    }

    /// Flush pending events and return those matching `pattern`.
    pub async fn events(&self, pattern: &str) -> Vec<Event> {
        self.coordinator.close().await;
        self.bus.history_matching(pattern)
    }

    pub async fn fail_tasks(&self, agent_id: &AgentId, count: usize) -> Result<()> {
        for _ in 0..count {
            let task_id = switchyard_core::ids::TaskId::new();
            self.coordinator.record_task_start(agent_id, task_id).await?;
            self.coordinator
                .record_task_completion(agent_id, task_id, false)
                .await?;
        }
        Ok(())
    }
}

/// Coordination layer publishing to a NATS container.
pub struct NatsContext {
    pub nats: NatsContainer,
    pub bus: Arc<NatsEventBus>,
    pub store: Arc<MemoryStore>,
    pub coordinator: Arc<Coordinator>,
}

impl NatsContext {
    pub async fn start(stream_name: &str) -> anyhow::Result<Self> {
        crate::init_test_logging();

        let nats = NatsContainer::start().await?;
        let bus = Arc::new(
            NatsEventBus::connect_with_config(
                NatsConfig::new(nats.url()).with_stream_name(stream_name),
            )
            .await?,
        );
        let store = Arc::new(MemoryStore::new());
        let coordinator = Arc::new(Coordinator::new(
            store.clone(),
            bus.clone(),
            crate::fixtures::fast_config(),
        ));

        Ok(Self {
            nats,
            bus,
            store,
            coordinator,
        })
    }

    pub fn nats_url(&self) -> &str {
        self.nats.url()
    }
}
