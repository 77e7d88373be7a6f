//! Health score and status derivation.
//!
//! Both functions are pure: the same record, configuration and clock reading
//! always produce the same result.

use crate::config::{HealthConfig, ScoreWeights};
use chrono::{DateTime, Utc};
use std::time::Duration;
use switchyard_core::health::{HealthRecord, HealthStatus};

const HEALTHY_ABOVE: f64 = 0.8;
const DEGRADED_ABOVE: f64 = 0.5;

/// Weighted score from already-normalised terms, clamped to `[0, 1]`.
///
/// `normalized_response` and `load_ratio` are in `[0, 1]` where higher is
/// worse.
pub fn score_from_parts(
    success_rate: f64,
    normalized_response: f64,
    load_ratio: f64,
    weights: &ScoreWeights,
) -> f64 {
    let score = weights.success * success_rate.clamp(0.0, 1.0)
        + weights.response * (1.0 - normalized_response.clamp(0.0, 1.0))
        + weights.load * (1.0 - load_ratio.clamp(0.0, 1.0));
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}

/// Score for a record from its rolling windows and current load.
pub fn compute_score(record: &HealthRecord, config: &HealthConfig) -> f64 {
    let normalized_response = match record.average_response_ms() {
        Some(avg) => avg / config.response_time_ceiling_ms.max(1) as f64,
        None => 0.0,
    };
    score_from_parts(
        record.success_rate(),
        normalized_response,
        record.load_ratio(),
        &config.weights,
    )
}

/// Status band for a score alone.
pub fn status_for_score(score: f64) -> HealthStatus {
    if score > HEALTHY_ABOVE {
        HealthStatus::Healthy
    } else if score > DEGRADED_ABOVE {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    }
}

/// Whether `last_seen` is older than `threshold` at `now`.
pub fn is_stale(last_seen: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> bool {
    let staleness_ms = (now - last_seen).num_milliseconds();
    staleness_ms > i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX)
}

/// Status of a record at `now`. Staleness wins over everything, then an
/// agent with no heartbeat and no outcomes is still initializing, then the
/// score decides.
pub fn derive_status(
    record: &HealthRecord,
    now: DateTime<Utc>,
    offline_threshold: Duration,
) -> HealthStatus {
    if is_stale(record.last_seen, now, offline_threshold) {
        HealthStatus::Offline
    } else if record.is_initializing() {
        HealthStatus::Initializing
    } else {
        status_for_score(record.health_score)
    }
}
