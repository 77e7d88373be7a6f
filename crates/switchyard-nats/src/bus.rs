//! NATS JetStream event bus for coordination events.

use async_nats::jetstream::{
    self, consumer::pull::Config as ConsumerConfig, stream::Config as StreamConfig,
};
use async_trait::async_trait;
use futures::StreamExt;
use switchyard_core::events::Event;
use switchyard_core::ports::{EventBus, EventStream};
use switchyard_core::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::{NatsConfig, STREAM_SUBJECTS};
use crate::health::HealthCheck;
use crate::metrics::NatsMetrics;

/// Event bus backed by a JetStream stream, so health, discovery and routing
/// events survive consumer restarts.
#[derive(Clone)]
pub struct NatsEventBus {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    config: NatsConfig,
    metrics: Arc<NatsMetrics>,
    shutdown: Arc<AtomicBool>,
}

impl NatsEventBus {
    /// Connect to a single server with default settings.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(NatsConfig::new(url)).await
    }

    /// Connect with custom configuration and make sure the stream exists.
    pub async fn connect_with_config(config: NatsConfig) -> Result<Self> {
        let urls = config.urls.join(",");
        info!("Connecting to NATS at {}", urls);

        let metrics = NatsMetrics::new();

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(config.connection_timeout)
            .request_timeout(Some(config.request_timeout))
            .retry_on_initial_connect()
            .connect(&urls)
            .await
            .map_err(|e| Error::EventBus(format!("Failed to connect to NATS: {}", e)))?;

        metrics.set_connected(true);

        let jetstream = jetstream::new(client.clone());

        let stream_config = StreamConfig {
            name: config.stream_name.clone(),
            subjects: STREAM_SUBJECTS.iter().map(|s| s.to_string()).collect(),
            retention: jetstream::stream::RetentionPolicy::Limits,
            max_age: config.max_age,
            storage: jetstream::stream::StorageType::File,
            ..Default::default()
        };

        jetstream
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| Error::EventBus(format!("Failed to create stream: {}", e)))?;

        info!(stream = %config.stream_name, "Connected to NATS and initialized JetStream");

        Ok(Self {
            client,
            jetstream,
            config,
            metrics,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get metrics.
    pub fn metrics(&self) -> &Arc<NatsMetrics> {
        &self.metrics
    }

    /// Check connection health.
    pub fn health_check(&self) -> HealthCheck {
        HealthCheck::from_metrics(&self.metrics, self.is_connected())
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }

    /// Check if shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Graceful shutdown - drain the connection.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Draining NATS connection");
        self.shutdown.store(true, Ordering::SeqCst);

        if let Err(e) = self.client.drain().await {
            error!("Error draining NATS connection: {}", e);
        }

        self.metrics.set_connected(false);
        Ok(())
    }

    async fn create_event_stream(
        &self,
        consumer: jetstream::consumer::Consumer<jetstream::consumer::pull::Config>,
    ) -> Result<EventStream> {
        let messages = consumer
            .messages()
            .await
            .map_err(|e| Error::EventBus(format!("Failed to get messages: {}", e)))?;

        let metrics = self.metrics.clone();
        let shutdown = self.shutdown.clone();

        let stream = messages.map(move |msg_result| {
            if shutdown.load(Ordering::SeqCst) {
                return Err(Error::EventBus("Shutdown in progress".to_string()));
            }

            match msg_result {
                Ok(msg) => {
                    metrics.record_receive();

                    // Ack is fire-and-forget; events are observability only.
                    drop(msg.ack());

                    serde_json::from_slice::<Event>(&msg.payload).map_err(|e| {
                        metrics.record_decode_failure();
                        Error::Serialization(e.to_string())
                    })
                }
                Err(e) => Err(Error::EventBus(format!("Message error: {}", e))),
            }
        });

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl EventBus for NatsEventBus {
    async fn publish(&self, event: Event) -> Result<()> {
        if self.is_shutdown() {
            return Err(Error::EventBus(
                "Cannot publish: shutdown in progress".to_string(),
            ));
        }

        let subject = event.subject();
        let payload = serde_json::to_vec(&event)?;
        let payload_len = payload.len() as u64;
        debug!("Publishing event to {}", subject);

        match self
            .jetstream
            .publish(subject.clone(), payload.into())
            .await
        {
            Ok(ack_future) => {
                ack_future.await.map_err(|e| {
                    self.metrics.record_publish_failure();
                    Error::EventBus(format!("Failed to confirm publish: {}", e))
                })?;
                self.metrics.record_publish(payload_len);
                Ok(())
            }
            Err(e) => {
                self.metrics.record_publish_failure();
                Err(Error::EventBus(format!(
                    "Failed to publish to {}: {}",
                    subject, e
                )))
            }
        }
    }

    async fn subscribe(&self, pattern: &str) -> Result<EventStream> {
        debug!("Subscribing to pattern: {}", pattern);

        let consumer = self
            .jetstream
            .create_consumer_on_stream(
                ConsumerConfig {
                    filter_subject: pattern.to_string(),
                    max_deliver: self.config.max_deliver,
                    ack_wait: Duration::from_secs(30),
                    ..Default::default()
                },
                &self.config.stream_name,
            )
            .await
            .map_err(|e| Error::EventBus(format!("Failed to create consumer: {}", e)))?;

        self.create_event_stream(consumer).await
    }
}
