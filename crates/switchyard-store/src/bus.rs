//! In-process event log with pattern subscriptions.

use async_trait::async_trait;
use futures::stream;
use switchyard_core::Result;
use switchyard_core::events::{Event, subject_matches};
use switchyard_core::ports::{EventBus, EventStream};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::metrics::BusMetrics;

const DEFAULT_HISTORY: usize = 10_000;
const CHANNEL_CAPACITY: usize = 1_024;

/// Append-only, capped event log that also fans events out to live
/// subscribers.
pub struct MemoryEventBus {
    log: Mutex<VecDeque<Event>>,
    max_history: usize,
    sender: broadcast::Sender<Event>,
    metrics: Arc<BusMetrics>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }

    /// Keep at most `max_history` events in the log.
    pub fn with_history(max_history: usize) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            log: Mutex::new(VecDeque::new()),
            max_history: max_history.max(1),
            sender,
            metrics: Arc::new(BusMetrics::default()),
        }
    }

    /// Every logged event, oldest first.
    pub fn history(&self) -> Vec<Event> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Logged events whose subject matches `pattern`.
    pub fn history_matching(&self, pattern: &str) -> Vec<Event> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|event| subject_matches(pattern, &event.subject()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn metrics(&self) -> &Arc<BusMetrics> {
        &self.metrics
    }
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, event: Event) -> Result<()> {
        {
            let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
            log.push_back(event.clone());
            while log.len() > self.max_history {
                log.pop_front();
                self.metrics.record_eviction();
            }
        }
        self.metrics.record_publish();

        // No live subscribers is fine; the log still has it.
        let _ = self.sender.send(event);
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<EventStream> {
        debug!(pattern, "Subscribing to in-process event log");

        let receiver = self.sender.subscribe();
        let pattern = pattern.to_string();
        let metrics = Arc::clone(&self.metrics);

        let events = stream::unfold(receiver, move |mut receiver| {
            let pattern = pattern.clone();
            let metrics = Arc::clone(&metrics);
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(event) => {
                            if subject_matches(&pattern, &event.subject()) {
                                metrics.record_delivery();
                                return Some((Ok(event), receiver));
                            }
                        }
                        Err(RecvError::Lagged(missed)) => metrics.record_lag(missed),
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(Box::pin(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use futures::StreamExt;
    use switchyard_core::events::{AgentErrorPayload, HeartbeatPayload};
    use switchyard_core::health::HealthStatus;
    use switchyard_core::ids::AgentId;
    use std::time::Duration;

    fn heartbeat(agent: &str) -> Event {
        Event::Heartbeat(HeartbeatPayload {
            agent_id: AgentId::from(agent),
            status: HealthStatus::Healthy,
            current_load: 0,
            timestamp: Utc::now(),
        })
    }

    fn error(agent: &str) -> Event {
        Event::AgentError(AgentErrorPayload {
            agent_id: AgentId::from(agent),
            message: "boom".to_string(),
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let bus = MemoryEventBus::with_history(2);
        bus.publish(heartbeat("a")).await.unwrap();
        bus.publish(heartbeat("b")).await.unwrap();
        bus.publish(heartbeat("c")).await.unwrap();

        let history = bus.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].agent_id(), Some(&AgentId::from("b")));
        assert_eq!(bus.metrics().snapshot().evicted, 1);
    }

    #[tokio::test]
    async fn test_history_matching() {
        let bus = MemoryEventBus::new();
        bus.publish(heartbeat("a")).await.unwrap();
        bus.publish(error("a")).await.unwrap();

        assert_eq!(bus.history_matching("health.*.error").len(), 1);
        assert_eq!(bus.history_matching("health.>").len(), 2);
        assert!(bus.history_matching("routing.>").is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_filters_by_pattern() {
        let bus = MemoryEventBus::new();
        let mut stream = bus.subscribe("health.*.error").await.unwrap();

        bus.publish(heartbeat("a")).await.unwrap();
        bus.publish(error("a")).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("timeout waiting for event")
            .expect("stream ended")
            .unwrap();
        assert!(matches!(received, Event::AgentError(_)));
    }
}
