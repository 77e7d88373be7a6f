//! Configuration for the NATS event bus.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Subjects captured by the coordination event stream.
pub const STREAM_SUBJECTS: [&str; 3] = ["health.>", "discovery.>", "routing.>"];

/// Configuration for the NATS event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URLs (joined with commas for a cluster).
    pub urls: Vec<String>,
    /// JetStream stream holding coordination events.
    pub stream_name: String,
    /// Connection timeout.
    #[serde(with = "secs")]
    pub connection_timeout: Duration,
    /// Request timeout for JetStream operations.
    #[serde(with = "secs")]
    pub request_timeout: Duration,
    /// Maximum delivery attempts per consumer message.
    pub max_deliver: i64,
    /// How long events are retained in the stream.
    #[serde(with = "secs")]
    pub max_age: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            urls: vec!["nats://localhost:4222".to_string()],
            stream_name: "SWITCHYARD_EVENTS".to_string(),
            connection_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            max_deliver: 3,
            max_age: Duration::from_secs(86400 * 3), // 3 days
        }
    }
}

impl NatsConfig {
    /// Create a new config with a single URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            ..Default::default()
        }
    }

    /// Set multiple server URLs for cluster support.
    pub fn with_urls(mut self, urls: Vec<String>) -> Self {
        self.urls = urls;
        self
    }

    /// Set the stream name.
    pub fn with_stream_name(mut self, name: impl Into<String>) -> Self {
        self.stream_name = name.into();
        self
    }

    /// Set max delivery attempts.
    pub fn with_max_deliver(mut self, max: i64) -> Self {
        self.max_deliver = max;
        self
    }

    /// Set event retention.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
