//! Heartbeat loop for locally hosted agents.

use crate::coordinator::Coordinator;
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::ids::AgentId;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info};

/// Periodically reports liveness for a fixed set of agents.
pub struct HeartbeatService {
    agents: Vec<AgentId>,
    coordinator: Arc<Coordinator>,
    interval: Duration,
}

impl HeartbeatService {
    pub fn new(agents: Vec<AgentId>, coordinator: Arc<Coordinator>, interval: Duration) -> Self {
        Self {
            agents,
            coordinator,
            interval,
        }
    }

    /// Run the heartbeat loop until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);

        info!(
            agents = self.agents.len(),
            interval_ms = self.interval.as_millis() as u64,
            "Starting heartbeat service"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.send_heartbeats().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Heartbeat service shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn send_heartbeats(&self) {
        for agent_id in &self.agents {
            if let Err(e) = self.coordinator.record_heartbeat(agent_id).await {
                error!(agent_id = %agent_id, error = %e, "Failed to send heartbeat");
            } else {
                debug!(agent_id = %agent_id, "Heartbeat sent");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorConfig;
    use switchyard_core::agent::AgentRegistration;
    use switchyard_store::{MemoryEventBus, MemoryStore};

    #[tokio::test]
    async fn test_heartbeats_until_shutdown() {
        let coordinator = Arc::new(Coordinator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryEventBus::new()),
            CoordinatorConfig::default(),
        ));
        coordinator
            .register_agent(AgentRegistration::new("beat", "code").with_capabilities(["code"]))
            .await
            .unwrap();
        let agent_id = AgentId::from("beat");
        assert!(
            coordinator
                .get_agent_health(&agent_id)
                .await
                .unwrap()
                .last_heartbeat
                .is_none()
        );

        let service = HeartbeatService::new(
            vec![agent_id.clone()],
            coordinator.clone(),
            Duration::from_millis(10),
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { service.run(rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let health = coordinator.get_agent_health(&agent_id).await.unwrap();
        assert!(health.last_heartbeat.is_some());
    }
}
