//! Router.

use crate::breaker::{CircuitBreakerState, Transition};
use crate::config::RouterConfig;
use crate::strategies::{Candidate, StrategyContext, preference_order};
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use switchyard_core::events::{
    BreakerStateChangedPayload, Event, RoutingDecisionPayload, RoutingFailedPayload,
};
use switchyard_core::health::HealthStatus;
use switchyard_core::ids::AgentId;
use switchyard_core::ports::{CoordinationStore, EventBus, load_json, save_json};
use switchyard_core::routing::{BreakerState, RoutingRequest, RoutingResult, RoutingStrategy};
use switchyard_core::{Error, EventEmitter, Result, keys};
use switchyard_discovery::{AgentQuery, DiscoveryService};
use switchyard_health::HealthMonitor;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Routing counters.
#[derive(Debug, Default)]
struct RouterMetrics {
    decisions: [AtomicU64; 5],
    failures: AtomicU64,
    retries: AtomicU64,
    breaker_trips: AtomicU64,
}

impl RouterMetrics {
    fn record_decision(&self, strategy: RoutingStrategy) {
        self.decisions[strategy_slot(strategy)].fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RouterStats {
        RouterStats {
            decisions: RoutingStrategy::ALL
                .into_iter()
                .map(|s| {
                    (
                        s.as_str(),
                        self.decisions[strategy_slot(s)].load(Ordering::Relaxed),
                    )
                })
                .collect(),
            failures: self.failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            breaker_trips: self.breaker_trips.load(Ordering::Relaxed),
        }
    }
}

fn strategy_slot(strategy: RoutingStrategy) -> usize {
    RoutingStrategy::ALL
        .iter()
        .position(|s| *s == strategy)
        .unwrap_or(0)
}

/// A point-in-time snapshot of routing counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterStats {
    /// Successful routing decisions per strategy.
    pub decisions: BTreeMap<&'static str, u64>,
    /// Requests that ended without an agent.
    pub failures: u64,
    /// Attempts after the first inside `route_with_retry`.
    pub retries: u64,
    /// CLOSED or HALF_OPEN to OPEN transitions.
    pub breaker_trips: u64,
}

/// Why candidates were dropped during one attempt.
#[derive(Debug, Default)]
struct Exclusions {
    offline: usize,
    at_capacity: usize,
    breaker_open: usize,
    probe_taken: usize,
    below_min_health: usize,
}

impl Exclusions {
    fn describe(&self) -> String {
        let parts: Vec<String> = [
            (self.breaker_open, "breaker open"),
            (self.probe_taken, "probe in flight"),
            (self.offline, "offline"),
            (self.at_capacity, "at capacity"),
            (self.below_min_health, "below minimum health"),
        ]
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, reason)| format!("{} {}", count, reason))
        .collect();
        parts.join(", ")
    }
}

/// Candidates that survived the read-only filters of one attempt.
struct Gathered {
    live: Vec<Candidate>,
    exclusions: Exclusions,
    total: usize,
}

/// Picks one agent per task and owns the per-agent circuit breakers.
///
/// Only the router writes `breaker:{id}`. Breaker reads, transitions and
/// HALF_OPEN probe claims happen under `breaker_lock`, so concurrent
/// requests in this process never both take the same probe. Health
/// snapshots used for a decision are read from the health monitor at
/// decision time and may lag concurrent updates by one write.
pub struct Router {
    store: Arc<dyn CoordinationStore>,
    discovery: Arc<DiscoveryService>,
    health: Arc<HealthMonitor>,
    emitter: EventEmitter,
    config: RouterConfig,
    breaker_lock: tokio::sync::Mutex<()>,
    cursors: Mutex<HashMap<String, usize>>,
    rng: Mutex<StdRng>,
    metrics: RouterMetrics,
}

impl Router {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        bus: Arc<dyn EventBus>,
        discovery: Arc<DiscoveryService>,
        health: Arc<HealthMonitor>,
        config: RouterConfig,
    ) -> Self {
        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            store,
            discovery,
            health,
            emitter: EventEmitter::new("router", bus),
            config,
            breaker_lock: tokio::sync::Mutex::new(()),
            cursors: Mutex::new(HashMap::new()),
            rng: Mutex::new(rng),
            metrics: RouterMetrics::default(),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn init(&self) {
        self.emitter.start();
    }

    pub async fn close(&self) {
        self.emitter.close().await;
    }

    /// Single routing attempt.
    ///
    /// Not finding an agent is a normal outcome reported in the result. Only
    /// store failures come back as `Err`.
    pub async fn route(&self, request: &RoutingRequest) -> Result<RoutingResult> {
        let started = Instant::now();
        let strategy = self.strategy_for(request);
        let result = self
            .attempt(request, strategy, None)
            .await?
            .with_latency_ms(started.elapsed().as_millis() as u64);
        if !result.success {
            self.publish_failure(request, &result);
        }
        Ok(result)
    }

    /// Route with retries and exponential backoff inside the request's
    /// wall-clock budget. Every attempt re-reads discovery, health and the
    /// breakers. No attempt or backoff is started once it cannot fit in the
    /// remaining budget.
    pub async fn route_with_retry(&self, request: &RoutingRequest) -> Result<RoutingResult> {
        let started = Instant::now();
        let deadline = started + request.timeout();
        let strategy = self.strategy_for(request);
        let max_attempts = request.max_retries.max(1);
        let mut errors = Vec::new();
        let mut attempts = 0;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let backoff = self.config.backoff(attempt - 1);
                if Instant::now() + backoff >= deadline {
                    errors.push(format!(
                        "attempt {}: not started, {} ms backoff exceeds the remaining budget",
                        attempt,
                        backoff.as_millis()
                    ));
                    break;
                }
                tokio::time::sleep(backoff).await;
                self.metrics.retries.fetch_add(1, Ordering::Relaxed);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                errors.push(format!("attempt {}: not started, budget exhausted", attempt));
                break;
            }

            attempts = attempt;
            match self.attempt(request, strategy, Some(deadline)).await {
                Ok(result) if result.success => {
                    return Ok(result
                        .with_attempts(attempt)
                        .with_latency_ms(started.elapsed().as_millis() as u64));
                }
                Ok(result) => {
                    let message = result.error_message.unwrap_or_default();
                    debug!(task_id = %request.task_id, attempt, error = %message, "Routing attempt failed");
                    errors.push(format!("attempt {}: {}", attempt, message));
                }
                Err(e @ Error::Timeout { .. }) => {
                    errors.push(format!("attempt {}: {}", attempt, e));
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let message = format!(
            "no agent available for task type {} after {} attempt(s): {}",
            request.task_type,
            attempts,
            errors.join("; ")
        );
        let result = RoutingResult::failed(request.task_id, strategy, message)
            .with_attempts(attempts)
            .with_latency_ms(started.elapsed().as_millis() as u64);
        self.publish_failure(request, &result);
        Ok(result)
    }

    /// Feed a task outcome into the agent's breaker. Returns the state after
    /// the update.
    pub async fn record_outcome(&self, agent_id: &AgentId, success: bool) -> Result<BreakerState> {
        let _guard = self.breaker_lock.lock().await;
        let now = Utc::now();
        let mut breaker = self.load_breaker(agent_id).await?;

        let mut transitions: Vec<Transition> = Vec::new();
        transitions.extend(breaker.refresh(now, &self.config.breaker));
        let outcome = if success {
            breaker.record_success(now, &self.config.breaker)
        } else {
            breaker.record_failure(now, &self.config.breaker)
        };
        transitions.extend(outcome);

        self.save_breaker(&breaker).await?;
        self.publish_transitions(&breaker, &transitions, now);
        Ok(breaker.state)
    }

    /// Current breaker position, with any elapsed cooldown applied.
    pub async fn breaker_state(&self, agent_id: &AgentId) -> Result<BreakerState> {
        Ok(self.breaker(agent_id).await?.state)
    }

    /// Full breaker record as it would be seen by the next routing attempt.
    pub async fn breaker(&self, agent_id: &AgentId) -> Result<CircuitBreakerState> {
        let mut breaker = self.load_breaker(agent_id).await?;
        breaker.refresh(Utc::now(), &self.config.breaker);
        Ok(breaker)
    }

    /// Force a breaker back to CLOSED.
    pub async fn reset_breaker(&self, agent_id: &AgentId) -> Result<()> {
        let _guard = self.breaker_lock.lock().await;
        let breaker = self.load_breaker(agent_id).await?;
        self.store.delete(&keys::breaker(agent_id)).await?;
        self.store
            .set_remove(keys::BREAKER_INDEX, agent_id.as_str())
            .await?;

        if breaker.state != BreakerState::Closed {
            info!(agent_id = %agent_id, from = ?breaker.state, "Circuit breaker reset");
            let closed = CircuitBreakerState::new(agent_id.clone());
            self.publish_transitions(&closed, &[(breaker.state, BreakerState::Closed)], Utc::now());
        }
        Ok(())
    }

    pub fn stats(&self) -> RouterStats {
        self.metrics.snapshot()
    }

    fn strategy_for(&self, request: &RoutingRequest) -> RoutingStrategy {
        request.strategy.unwrap_or(self.config.default_strategy)
    }

    /// One routing attempt. With a `deadline`, only the read-only candidate
    /// gathering and the wait for `breaker_lock` can time out; once the lock
    /// is held the attempt runs to the end, so a claimed probe is always
    /// handed to the caller.
    async fn attempt(
        &self,
        request: &RoutingRequest,
        strategy: RoutingStrategy,
        deadline: Option<Instant>,
    ) -> Result<RoutingResult> {
        let started = Instant::now();
        let gathered = match deadline {
            Some(deadline) => {
                within(deadline, request, self.gather(request, strategy)).await??
            }
            None => self.gather(request, strategy).await?,
        };
        let Gathered {
            live,
            mut exclusions,
            total,
        } = match gathered {
            Ok(gathered) => gathered,
            Err(failed) => return Ok(failed),
        };

        let _guard = match deadline {
            Some(deadline) => within(deadline, request, self.breaker_lock.lock()).await?,
            None => self.breaker_lock.lock().await,
        };
        let now = Utc::now();

        let mut candidates = Vec::with_capacity(live.len());
        let mut breakers = Vec::with_capacity(live.len());
        for candidate in live {
            let mut breaker = self.load_breaker(&candidate.record.agent_id).await?;
            let transitions: Vec<Transition> =
                breaker.refresh(now, &self.config.breaker).into_iter().collect();
            if !transitions.is_empty() {
                self.save_breaker(&breaker).await?;
                self.publish_transitions(&breaker, &transitions, now);
            }
            if !breaker.admits() {
                if breaker.state == BreakerState::Open {
                    exclusions.breaker_open += 1;
                } else {
                    exclusions.probe_taken += 1;
                }
                continue;
            }
            candidates.push(candidate);
            breakers.push(breaker);
        }

        let order = {
            let cursor = self.cursor(&request.task_type);
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            let mut ctx = StrategyContext {
                min_health_score: self.config.min_health_score,
                cursor,
                rng: &mut *rng,
            };
            preference_order(strategy, &candidates, &mut ctx)
        };
        exclusions.below_min_health = candidates.len() - order.len();

        for (position, index) in order.iter().enumerate() {
            let breaker = &mut breakers[*index];
            if breaker.state == BreakerState::HalfOpen {
                if !breaker.claim_probe(now) {
                    exclusions.probe_taken += 1;
                    continue;
                }
                self.save_breaker(breaker).await?;
                info!(agent_id = %breaker.agent_id, task_id = %request.task_id, "Sending half-open probe");
            }

            let chosen = &candidates[*index];
            if strategy == RoutingStrategy::RoundRobin {
                self.advance_cursor(&request.task_type, position + 1);
            }

            let agent_id = chosen.record.agent_id.clone();
            let latency_ms = started.elapsed().as_millis() as u64;
            self.metrics.record_decision(strategy);
            info!(
                task_id = %request.task_id,
                task_type = %request.task_type,
                agent_id = %agent_id,
                strategy = %strategy,
                candidates = candidates.len(),
                "Task routed"
            );
            self.emitter.emit(Event::RoutingDecision(RoutingDecisionPayload {
                task_id: request.task_id,
                task_type: request.task_type.clone(),
                agent_id: agent_id.clone(),
                strategy,
                candidates: candidates.len() as u32,
                latency_ms,
                timestamp: now,
            }));
            return Ok(RoutingResult::routed(request.task_id, agent_id, strategy)
                .with_latency_ms(latency_ms));
        }

        Ok(RoutingResult::failed(
            request.task_id,
            strategy,
            format!(
                "{}: {} candidate(s) excluded ({})",
                Error::NoEligibleCandidate(request.task_type.clone()),
                total,
                exclusions.describe()
            ),
        ))
    }

    /// Registered candidates minus offline and full agents. `Err` inside
    /// the result is a routing failure to report as is.
    async fn gather(
        &self,
        request: &RoutingRequest,
        strategy: RoutingStrategy,
    ) -> Result<std::result::Result<Gathered, RoutingResult>> {
        let query = AgentQuery {
            required_capabilities: request.required_capabilities.clone(),
            preferred_tags: request.preferred_tags.clone(),
            agent_type: request.agent_type.clone(),
        };
        if let Err(e) = query.validate() {
            return Ok(Err(RoutingResult::failed(request.task_id, strategy, e.to_string())));
        }

        let records = self.discovery.find_agent_records(&query).await?;
        if records.is_empty() {
            return Ok(Err(RoutingResult::failed(
                request.task_id,
                strategy,
                format!(
                    "no registered agent offers {:?}",
                    request.required_capabilities
                ),
            )));
        }
        let total = records.len();

        let mut exclusions = Exclusions::default();
        let mut live = Vec::with_capacity(records.len());
        for record in records {
            let health = match self.health.get_agent_health(&record.agent_id).await {
                Ok(health) => health,
                Err(Error::AgentNotFound(_)) => {
                    exclusions.offline += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            if health.status == HealthStatus::Offline {
                exclusions.offline += 1;
                continue;
            }
            if self.config.enforce_capacity && !health.has_capacity() {
                exclusions.at_capacity += 1;
                continue;
            }
            live.push(Candidate { record, health });
        }

        Ok(Ok(Gathered {
            live,
            exclusions,
            total,
        }))
    }

    fn cursor(&self, task_type: &str) -> usize {
        let cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
        cursors.get(task_type).copied().unwrap_or(0)
    }

    fn advance_cursor(&self, task_type: &str, step: usize) {
        let mut cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
        let cursor = cursors.entry(task_type.to_string()).or_insert(0);
        *cursor = cursor.wrapping_add(step);
    }

    async fn load_breaker(&self, agent_id: &AgentId) -> Result<CircuitBreakerState> {
        Ok(
            load_json::<CircuitBreakerState>(self.store.as_ref(), &keys::breaker(agent_id))
                .await?
                .unwrap_or_else(|| CircuitBreakerState::new(agent_id.clone())),
        )
    }

    async fn save_breaker(&self, breaker: &CircuitBreakerState) -> Result<()> {
        save_json(self.store.as_ref(), &keys::breaker(&breaker.agent_id), breaker).await?;
        self.store
            .set_add(keys::BREAKER_INDEX, breaker.agent_id.as_str())
            .await?;
        Ok(())
    }

    fn publish_transitions(
        &self,
        breaker: &CircuitBreakerState,
        transitions: &[Transition],
        now: DateTime<Utc>,
    ) {
        for (previous, current) in transitions {
            if *current == BreakerState::Open {
                self.metrics.breaker_trips.fetch_add(1, Ordering::Relaxed);
                warn!(
                    agent_id = %breaker.agent_id,
                    failure_count = breaker.failure_count(),
                    "Circuit breaker opened"
                );
            } else {
                info!(agent_id = %breaker.agent_id, from = ?previous, to = ?current, "Circuit breaker state changed");
            }
            self.emitter
                .emit(Event::BreakerStateChanged(BreakerStateChangedPayload {
                    agent_id: breaker.agent_id.clone(),
                    previous: *previous,
                    current: *current,
                    failure_count: breaker.failure_count(),
                    timestamp: now,
                }));
        }
    }

    fn publish_failure(&self, request: &RoutingRequest, result: &RoutingResult) {
        self.metrics.failures.fetch_add(1, Ordering::Relaxed);
        let error_message = result.error_message.clone().unwrap_or_default();
        warn!(
            task_id = %request.task_id,
            task_type = %request.task_type,
            attempts = result.attempts,
            error = %error_message,
            "Routing failed"
        );
        self.emitter.emit(Event::RoutingFailed(RoutingFailedPayload {
            task_id: request.task_id,
            task_type: request.task_type.clone(),
            strategy: result.routing_strategy,
            attempts: result.attempts,
            error_message,
            timestamp: Utc::now(),
        }));
    }
}

/// Await `future` unless `deadline` passes first.
async fn within<F: std::future::Future>(
    deadline: Instant,
    request: &RoutingRequest,
    future: F,
) -> Result<F::Output> {
    tokio::time::timeout_at(deadline, future)
        .await
        .map_err(|_| Error::Timeout {
            millis: request.timeout().as_millis() as u64,
        })
}
