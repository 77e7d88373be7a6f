//! Fire-and-forget event publishing.

use crate::events::Event;
use crate::ports::EventBus;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Queues events for a background forwarder so callers never wait on the
/// bus. Publish failures are logged and dropped.
///
/// Events emitted before [`EventEmitter::start`] are buffered and delivered
/// once the forwarder runs. [`EventEmitter::close`] delivers everything
/// already queued before returning.
pub struct EventEmitter {
    source: &'static str,
    bus: Arc<dyn EventBus>,
    tx: Mutex<Option<mpsc::UnboundedSender<Event>>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl EventEmitter {
    pub fn new(source: &'static str, bus: Arc<dyn EventBus>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            source,
            bus,
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            forwarder: Mutex::new(None),
        }
    }

    /// Queue an event. Never blocks.
    pub fn emit(&self, event: Event) {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(event).is_err() {
                    debug!(source = self.source, "Event forwarder gone, dropping event");
                }
            }
            None => debug!(source = self.source, "Emitter closed, dropping event"),
        }
    }

    /// Spawn the forwarder task. Calling it twice is a no-op.
    pub fn start(&self) {
        let rx = self.rx.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(mut rx) = rx else {
            return;
        };

        let bus = Arc::clone(&self.bus);
        let source = self.source;
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let subject = event.subject();
                if let Err(e) = bus.publish(event).await {
                    warn!(source, subject = %subject, error = %e, "Failed to publish event");
                }
            }
            debug!(source, "Event forwarder stopped");
        });

        *self.forwarder.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Stop accepting events and deliver the ones already queued.
    pub async fn close(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();

        let handle = self
            .forwarder
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(source = self.source, error = %e, "Event forwarder panicked");
            }
            return;
        }

        // Never started: flush inline.
        let rx = self.rx.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(mut rx) = rx {
            while let Ok(event) = rx.try_recv() {
                if let Err(e) = self.bus.publish(event).await {
                    warn!(source = self.source, error = %e, "Failed to publish event");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{AgentErrorPayload, Event};
    use crate::ids::AgentId;
    use crate::ports::EventStream;
    use crate::Result;
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingBus {
        events: Mutex<Vec<Event>>,
    }

    #[async_trait]
    impl EventBus for RecordingBus {
        async fn publish(&self, event: Event) -> Result<()> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }

        async fn subscribe(&self, _pattern: &str) -> Result<EventStream> {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    fn error_event(message: &str) -> Event {
        Event::AgentError(AgentErrorPayload {
            agent_id: AgentId::from("a"),
            message: message.to_string(),
            timestamp: chrono::Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_close_flushes_started_forwarder() {
        let bus = Arc::new(RecordingBus::default());
        let emitter = EventEmitter::new("test", bus.clone());
        emitter.start();
        emitter.emit(error_event("one"));
        emitter.emit(error_event("two"));
        emitter.close().await;

        assert_eq!(bus.events.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_close_flushes_without_start() {
        let bus = Arc::new(RecordingBus::default());
        let emitter = EventEmitter::new("test", bus.clone());
        emitter.emit(error_event("buffered"));
        emitter.close().await;
        emitter.emit(error_event("dropped"));

        assert_eq!(bus.events.lock().unwrap().len(), 1);
    }
}
