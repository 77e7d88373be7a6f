//! NATS event bus implementation for Switchyard.

mod bus;
pub mod config;
pub mod health;
pub mod metrics;

pub use bus::NatsEventBus;
pub use config::NatsConfig;
pub use health::{BusHealth, HealthCheck};
pub use metrics::{MetricsSnapshot, NatsMetrics};
