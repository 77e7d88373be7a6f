//! Per-agent circuit breaker.
//!
//! Transitions are pure functions of the stored state, the configuration and
//! the `now` passed in. The router applies them under its breaker lock and
//! persists the result under `breaker:{id}`.

use crate::config::BreakerConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use switchyard_core::ids::AgentId;
use switchyard_core::routing::BreakerState;

/// A state change: `(previous, current)`.
pub type Transition = (BreakerState, BreakerState);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub agent_id: AgentId,
    pub state: BreakerState,
    /// Failure times inside the rolling window, oldest first.
    #[serde(default)]
    pub failures: VecDeque<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    /// Set while a HALF_OPEN probe is outstanding.
    pub probe_started_at: Option<DateTime<Utc>>,
}

impl CircuitBreakerState {
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            state: BreakerState::Closed,
            failures: VecDeque::new(),
            opened_at: None,
            probe_started_at: None,
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.len() as u32
    }

    pub fn probe_in_flight(&self) -> bool {
        self.probe_started_at.is_some()
    }

    /// Apply time-based transitions: OPEN becomes HALF_OPEN once the cooldown
    /// has elapsed, and an abandoned probe is released.
    pub fn refresh(&mut self, now: DateTime<Utc>, config: &BreakerConfig) -> Option<Transition> {
        match self.state {
            BreakerState::Open => {
                let opened_at = self.opened_at.unwrap_or(now);
                if elapsed(opened_at, now) >= config.cooldown() {
                    self.state = BreakerState::HalfOpen;
                    self.probe_started_at = None;
                    return Some((BreakerState::Open, BreakerState::HalfOpen));
                }
                None
            }
            BreakerState::HalfOpen => {
                if let Some(started) = self.probe_started_at
                    && elapsed(started, now) >= config.probe_timeout()
                {
                    self.probe_started_at = None;
                }
                None
            }
            BreakerState::Closed => {
                self.prune(now, config);
                None
            }
        }
    }

    /// Whether a task may be sent to this agent right now.
    pub fn admits(&self) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => !self.probe_in_flight(),
            BreakerState::Open => false,
        }
    }

    /// Reserve the single HALF_OPEN probe. Returns false when it is taken or
    /// the breaker is not half open.
    pub fn claim_probe(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != BreakerState::HalfOpen || self.probe_in_flight() {
            return false;
        }
        self.probe_started_at = Some(now);
        true
    }

    pub fn record_success(&mut self, now: DateTime<Utc>, config: &BreakerConfig) -> Option<Transition> {
        match self.state {
            BreakerState::Closed => {
                self.prune(now, config);
                None
            }
            BreakerState::HalfOpen => {
                self.state = BreakerState::Closed;
                self.failures.clear();
                self.opened_at = None;
                self.probe_started_at = None;
                Some((BreakerState::HalfOpen, BreakerState::Closed))
            }
            // Late result from a task dispatched before the breaker opened.
            BreakerState::Open => None,
        }
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>, config: &BreakerConfig) -> Option<Transition> {
        match self.state {
            BreakerState::Closed => {
                self.failures.push_back(now);
                self.prune(now, config);
                if self.failure_count() >= config.failure_threshold.max(1) {
                    self.state = BreakerState::Open;
                    self.opened_at = Some(now);
                    return Some((BreakerState::Closed, BreakerState::Open));
                }
                None
            }
            BreakerState::HalfOpen => {
                self.failures.push_back(now);
                self.state = BreakerState::Open;
                self.opened_at = Some(now);
                self.probe_started_at = None;
                Some((BreakerState::HalfOpen, BreakerState::Open))
            }
            BreakerState::Open => None,
        }
    }

    fn prune(&mut self, now: DateTime<Utc>, config: &BreakerConfig) {
        let window = config.failure_window();
        while let Some(oldest) = self.failures.front() {
            if elapsed(*oldest, now) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn config() -> BreakerConfig {
        BreakerConfig::default()
            .with_failure_threshold(3)
            .with_failure_window_secs(60)
            .with_cooldown_secs(30)
    }

    fn breaker() -> CircuitBreakerState {
        CircuitBreakerState::new(AgentId::from("a"))
    }

    #[test]
    fn test_round_trip_through_every_state() {
        let config = config();
        let t0 = Utc::now();
        let mut b = breaker();

        assert_eq!(b.record_failure(t0, &config), None);
        assert_eq!(b.record_failure(t0, &config), None);
        assert_eq!(
            b.record_failure(t0, &config),
            Some((BreakerState::Closed, BreakerState::Open))
        );
        assert!(!b.admits());

        // Still cooling down.
        assert_eq!(b.refresh(t0 + TimeDelta::seconds(29), &config), None);
        assert_eq!(b.state, BreakerState::Open);

        let t1 = t0 + TimeDelta::seconds(30);
        assert_eq!(
            b.refresh(t1, &config),
            Some((BreakerState::Open, BreakerState::HalfOpen))
        );
        assert!(b.admits());

        assert_eq!(
            b.record_success(t1, &config),
            Some((BreakerState::HalfOpen, BreakerState::Closed))
        );
        assert_eq!(b.failure_count(), 0);
        assert!(b.admits());
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let config = config();
        let t0 = Utc::now();
        let mut b = breaker();
        for _ in 0..3 {
            b.record_failure(t0, &config);
        }
        let t1 = t0 + TimeDelta::seconds(31);
        b.refresh(t1, &config);
        assert!(b.claim_probe(t1));

        assert_eq!(
            b.record_failure(t1, &config),
            Some((BreakerState::HalfOpen, BreakerState::Open))
        );
        assert_eq!(b.opened_at, Some(t1));
        assert!(!b.probe_in_flight());
    }

    #[test]
    fn test_open_never_jumps_to_closed() {
        let config = config();
        let t0 = Utc::now();
        let mut b = breaker();
        for _ in 0..3 {
            b.record_failure(t0, &config);
        }
        assert_eq!(b.record_success(t0, &config), None);
        assert_eq!(b.state, BreakerState::Open);
    }

    #[test]
    fn test_single_probe() {
        let config = config();
        let t0 = Utc::now();
        let mut b = breaker();
        for _ in 0..3 {
            b.record_failure(t0, &config);
        }
        let t1 = t0 + TimeDelta::seconds(30);
        b.refresh(t1, &config);

        assert!(b.claim_probe(t1));
        assert!(!b.admits());
        assert!(!b.claim_probe(t1));

        // An abandoned probe is released after the probe timeout.
        b.refresh(t1 + TimeDelta::seconds(121), &config);
        assert!(b.admits());
    }

    #[test]
    fn test_failures_outside_window_do_not_count() {
        let config = config();
        let t0 = Utc::now();
        let mut b = breaker();
        b.record_failure(t0, &config);
        b.record_failure(t0, &config);

        let later = t0 + TimeDelta::seconds(61);
        assert_eq!(b.record_failure(later, &config), None);
        assert_eq!(b.failure_count(), 1);
        assert_eq!(b.state, BreakerState::Closed);
    }
}
