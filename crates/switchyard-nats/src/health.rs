//! Connection health for the NATS event bus.

use crate::metrics::NatsMetrics;
use std::sync::Arc;

/// Health status of the NATS connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusHealth {
    Healthy,
    /// Connected but losing events.
    Degraded { reason: String },
    Unhealthy { reason: String },
}

impl BusHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, BusHealth::Healthy)
    }

    /// Healthy or degraded.
    pub fn is_operational(&self) -> bool {
        matches!(self, BusHealth::Healthy | BusHealth::Degraded { .. })
    }
}

/// Health check result with details.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub status: BusHealth,
    pub connected: bool,
    pub messages_published: u64,
    pub publish_failures: u64,
}

impl HealthCheck {
    /// Create a health check from metrics.
    pub fn from_metrics(metrics: &Arc<NatsMetrics>, connected: bool) -> Self {
        let snapshot = metrics.snapshot();

        let status = if !connected {
            BusHealth::Unhealthy {
                reason: "Not connected to NATS".to_string(),
            }
        } else if snapshot.publish_failures > 0 {
            BusHealth::Degraded {
                reason: format!("{} publish failures recorded", snapshot.publish_failures),
            }
        } else {
            BusHealth::Healthy
        };

        Self {
            status,
            connected,
            messages_published: snapshot.messages_published,
            publish_failures: snapshot.publish_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_degrade_health() {
        let metrics = NatsMetrics::new();
        assert!(HealthCheck::from_metrics(&metrics, true).status.is_healthy());

        metrics.record_publish_failure();
        let check = HealthCheck::from_metrics(&metrics, true);
        assert!(!check.status.is_healthy());
        assert!(check.status.is_operational());

        let check = HealthCheck::from_metrics(&metrics, false);
        assert!(!check.status.is_operational());
    }
}
