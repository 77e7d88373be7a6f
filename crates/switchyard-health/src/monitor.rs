//! Health monitor.

use crate::config::HealthConfig;
use crate::score::{compute_score, derive_status, is_stale};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use switchyard_core::events::{
    AgentErrorPayload, AgentOverloadedPayload, Event, HealthRegisteredPayload,
    HealthStatusChangedPayload, HeartbeatPayload, TaskCompletedPayload, TaskStartedPayload,
};
use switchyard_core::health::{HealthRecord, HealthStatus, HealthSummary};
use switchyard_core::ids::{AgentId, TaskId};
use switchyard_core::ports::{CoordinationStore, EventBus, load_json, save_json};
use switchyard_core::{Error, EventEmitter, Result, keys};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Result of one status sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSweep {
    /// Records whose derived status changed.
    pub transitions: usize,
    /// Records removed because they exceeded the retention period.
    pub purged: usize,
    /// In-flight tasks dropped because they outlived the in-flight timeout.
    pub reaped: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorEntry {
    message: String,
    timestamp: DateTime<Utc>,
}

/// Tracks liveness, load and outcomes per agent.
///
/// Only this component writes `health:{id}` records. Read-modify-write
/// cycles are serialised behind `write_lock`, and every write re-reads the
/// record under the lock, so snapshots handed to other components are at
/// least as fresh as the last completed write in this process. Across
/// processes the store is last-write-wins.
///
/// Operations on unknown agents are logged and dropped, since heartbeats and
/// task reports can race registration.
pub struct HealthMonitor {
    store: Arc<dyn CoordinationStore>,
    emitter: EventEmitter,
    config: HealthConfig,
    write_lock: tokio::sync::Mutex<()>,
    shutdown_tx: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        bus: Arc<dyn EventBus>,
        config: HealthConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            emitter: EventEmitter::new("health", bus),
            config,
            write_lock: tokio::sync::Mutex::new(()),
            shutdown_tx,
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Start event delivery and the background status sweep.
    pub fn init(self: &Arc<Self>) {
        self.emitter.start();

        let mut guard = self.sweeper.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            return;
        }

        let monitor = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();
        *guard = Some(tokio::spawn(async move {
            let mut ticker = interval(monitor.config.check_interval());
            info!(
                interval_secs = monitor.config.check_interval_secs,
                "Starting health status sweep"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = monitor.sweep().await {
                            error!(error = %e, "Health status sweep failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("Health status sweep shutting down");
                            break;
                        }
                    }
                }
            }
        }));
    }

    /// Stop the sweep and flush pending events.
    pub async fn close(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.sweeper.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Health status sweep panicked");
            }
        }
        self.emitter.close().await;
    }

    /// Create a record in INITIALIZING if none exists. Idempotent.
    pub async fn register_agent(&self, agent_id: &AgentId, agent_type: &str) -> Result<()> {
        self.upsert(agent_id, agent_type, None).await
    }

    /// Like [`HealthMonitor::register_agent`], but also sets the capacity
    /// used for load ratios. Re-registering an existing agent refreshes its
    /// type, capacity and `last_seen`.
    pub async fn register_agent_with_capacity(
        &self,
        agent_id: &AgentId,
        agent_type: &str,
        max_concurrent_tasks: u32,
    ) -> Result<()> {
        self.upsert(agent_id, agent_type, Some(max_concurrent_tasks))
            .await
    }

    async fn upsert(
        &self,
        agent_id: &AgentId,
        agent_type: &str,
        capacity: Option<u32>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let key = keys::health(agent_id);

        match load_json::<HealthRecord>(self.store.as_ref(), &key).await? {
            Some(mut record) => {
                let Some(max) = capacity else {
                    debug!(agent_id = %agent_id, "Health record already exists");
                    return Ok(());
                };
                record.agent_type = agent_type.to_string();
                record.max_concurrent_tasks = max.max(1);
                record.last_seen = now;
                let previous = self.refresh(&mut record, now);
                save_json(self.store.as_ref(), &key, &record).await?;
                self.store.set_add(keys::HEALTH_INDEX, agent_id.as_str()).await?;
                self.emit_transition(&record, previous, now);
            }
            None => {
                let mut record = HealthRecord::new(agent_id.clone(), agent_type.to_string(), now);
                record.max_concurrent_tasks = capacity.unwrap_or(1).max(1);
                self.refresh(&mut record, now);
                save_json(self.store.as_ref(), &key, &record).await?;
                self.store.set_add(keys::HEALTH_INDEX, agent_id.as_str()).await?;

                info!(
                    agent_id = %agent_id,
                    agent_type,
                    max_concurrent_tasks = record.max_concurrent_tasks,
                    "Registered agent health record"
                );
                self.emitter.emit(Event::HealthRegistered(HealthRegisteredPayload {
                    agent_id: agent_id.clone(),
                    agent_type: agent_type.to_string(),
                    max_concurrent_tasks: record.max_concurrent_tasks,
                    timestamp: now,
                }));
            }
        }
        Ok(())
    }

    /// Mark the agent alive now.
    pub async fn record_heartbeat(&self, agent_id: &AgentId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let key = keys::health(agent_id);

        let Some(mut record) = load_json::<HealthRecord>(self.store.as_ref(), &key).await? else {
            warn!(agent_id = %agent_id, "Heartbeat from unknown agent, dropping");
            return Ok(());
        };

        record.last_heartbeat = Some(now);
        record.last_seen = now;
        let previous = self.refresh(&mut record, now);
        save_json(self.store.as_ref(), &key, &record).await?;

        debug!(agent_id = %agent_id, status = %record.status, "Heartbeat recorded");
        self.emitter.emit(Event::Heartbeat(HeartbeatPayload {
            agent_id: agent_id.clone(),
            status: record.status,
            current_load: record.current_load,
            timestamp: now,
        }));
        self.emit_transition(&record, previous, now);
        Ok(())
    }

    /// Count a task as in flight. Exceeding capacity is recorded as an
    /// overload, never rejected.
    pub async fn record_task_start(&self, agent_id: &AgentId, task_id: TaskId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let key = keys::health(agent_id);

        let Some(mut record) = load_json::<HealthRecord>(self.store.as_ref(), &key).await? else {
            warn!(agent_id = %agent_id, task_id = %task_id, "Task start for unknown agent, dropping");
            return Ok(());
        };

        if record.in_flight.insert(task_id, now).is_some() {
            debug!(agent_id = %agent_id, task_id = %task_id, "Task already in flight, restarting its clock");
        }
        record.current_load = in_flight_load(&record);
        let previous = self.refresh(&mut record, now);
        save_json(self.store.as_ref(), &key, &record).await?;

        if record.current_load > record.max_concurrent_tasks {
            let overload = Error::Overload {
                agent_id: agent_id.to_string(),
                current_load: record.current_load,
                max_concurrent_tasks: record.max_concurrent_tasks,
            };
            warn!(task_id = %task_id, "{}", overload);
            self.emitter.emit(Event::AgentOverloaded(AgentOverloadedPayload {
                agent_id: agent_id.clone(),
                task_id,
                current_load: record.current_load,
                max_concurrent_tasks: record.max_concurrent_tasks,
                timestamp: now,
            }));
        }

        debug!(agent_id = %agent_id, task_id = %task_id, current_load = record.current_load, "Task started");
        self.emitter.emit(Event::TaskStarted(TaskStartedPayload {
            agent_id: agent_id.clone(),
            task_id,
            current_load: record.current_load,
            timestamp: now,
        }));
        self.emit_transition(&record, previous, now);
        Ok(())
    }

    /// Record a finished task and recompute the score. Returns whether the
    /// completion was counted: completions for unknown agents, and for tasks
    /// that are not in flight (duplicates, or reaped by the sweep), are
    /// logged and dropped.
    pub async fn record_task_completion(
        &self,
        agent_id: &AgentId,
        task_id: TaskId,
        success: bool,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let key = keys::health(agent_id);

        let Some(mut record) = load_json::<HealthRecord>(self.store.as_ref(), &key).await? else {
            warn!(agent_id = %agent_id, task_id = %task_id, "Task completion for unknown agent, dropping");
            return Ok(false);
        };

        let Some(started) = record.in_flight.remove(&task_id) else {
            warn!(agent_id = %agent_id, task_id = %task_id, "Completion for a task not in flight, dropping");
            return Ok(false);
        };
        record.current_load = in_flight_load(&record);
        let duration_ms = (now - started).num_milliseconds().max(0) as u64;
        push_bounded(&mut record.recent_response_ms, duration_ms, self.config.response_window);
        push_bounded(&mut record.recent_outcomes, success, self.config.outcome_window);
        if success {
            record.success_count += 1;
        } else {
            record.failure_count += 1;
        }
        let previous = self.refresh(&mut record, now);
        save_json(self.store.as_ref(), &key, &record).await?;

        debug!(
            agent_id = %agent_id,
            task_id = %task_id,
            success,
            health_score = record.health_score,
            "Task completed"
        );
        self.emitter.emit(Event::TaskCompleted(TaskCompletedPayload {
            agent_id: agent_id.clone(),
            task_id,
            success,
            duration_ms: Some(duration_ms),
            health_score: record.health_score,
            timestamp: now,
        }));
        self.emit_transition(&record, previous, now);
        Ok(true)
    }

    /// Remember an error reported by or about an agent.
    pub async fn record_error(&self, agent_id: &AgentId, message: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let key = keys::health(agent_id);

        let Some(mut record) = load_json::<HealthRecord>(self.store.as_ref(), &key).await? else {
            warn!(agent_id = %agent_id, "Error report for unknown agent, dropping");
            return Ok(());
        };

        push_bounded(
            &mut record.recent_errors,
            message.to_string(),
            self.config.max_recent_errors,
        );
        save_json(self.store.as_ref(), &key, &record).await?;

        let entry = serde_json::to_string(&ErrorEntry {
            message: message.to_string(),
            timestamp: now,
        })?;
        self.store
            .append(&keys::errors(agent_id), entry, self.config.max_recent_errors)
            .await?;

        warn!(agent_id = %agent_id, message, "Agent error recorded");
        self.emitter.emit(Event::AgentError(AgentErrorPayload {
            agent_id: agent_id.clone(),
            message: message.to_string(),
            timestamp: now,
        }));
        Ok(())
    }

    /// Snapshot with status derived at read time.
    pub async fn get_agent_health(&self, agent_id: &AgentId) -> Result<HealthRecord> {
        let now = Utc::now();
        let mut record = load_json::<HealthRecord>(self.store.as_ref(), &keys::health(agent_id))
            .await?
            .ok_or_else(|| Error::AgentNotFound(agent_id.to_string()))?;
        record.status = derive_status(&record, now, self.config.offline_threshold());
        Ok(record)
    }

    /// Logged error history with timestamps, oldest first.
    pub async fn error_history(&self, agent_id: &AgentId) -> Result<Vec<(DateTime<Utc>, String)>> {
        let raw = self
            .store
            .range(&keys::errors(agent_id), self.config.max_recent_errors)
            .await?;
        let mut history = Vec::with_capacity(raw.len());
        for entry in raw {
            let entry: ErrorEntry = serde_json::from_str(&entry)?;
            history.push((entry.timestamp, entry.message));
        }
        Ok(history)
    }

    /// Every known record, ordered by agent id.
    pub async fn get_all_health(&self) -> Result<Vec<HealthRecord>> {
        let now = Utc::now();
        let ids = self.store.set_members(keys::HEALTH_INDEX).await?;
        let mut records = Vec::with_capacity(ids.len());

        for id in ids {
            let agent_id = AgentId::new(id);
            match load_json::<HealthRecord>(self.store.as_ref(), &keys::health(&agent_id)).await? {
                Some(mut record) => {
                    record.status = derive_status(&record, now, self.config.offline_threshold());
                    records.push(record);
                }
                None => {
                    debug!(agent_id = %agent_id, "Dropping dangling health index entry");
                    self.store
                        .set_remove(keys::HEALTH_INDEX, agent_id.as_str())
                        .await?;
                }
            }
        }
        Ok(records)
    }

    /// Records that can take work (not OFFLINE or UNHEALTHY), optionally of
    /// one agent type.
    pub async fn get_healthy_agents(&self, agent_type: Option<&str>) -> Result<Vec<HealthRecord>> {
        Ok(self
            .get_all_health()
            .await?
            .into_iter()
            .filter(|r| r.status.is_available())
            .filter(|r| agent_type.is_none_or(|t| r.agent_type == t))
            .collect())
    }

    /// Count of agents per status.
    pub async fn summary(&self) -> Result<HealthSummary> {
        let mut summary = HealthSummary::default();
        for record in self.get_all_health().await? {
            summary.add(record.status);
        }
        Ok(summary)
    }

    /// Drop an agent's record and error history. Returns whether it existed.
    pub async fn remove_agent(&self, agent_id: &AgentId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let existed = self.store.delete(&keys::health(agent_id)).await?;
        self.store
            .set_remove(keys::HEALTH_INDEX, agent_id.as_str())
            .await?;
        self.store.delete(&keys::errors(agent_id)).await?;
        if existed {
            info!(agent_id = %agent_id, "Removed agent health record");
        }
        Ok(existed)
    }

    /// Re-derive every status, publish transitions, reap in-flight tasks
    /// past the in-flight timeout and purge records past retention.
    pub async fn sweep(&self) -> Result<StatusSweep> {
        let mut report = StatusSweep::default();
        let ids = self.store.set_members(keys::HEALTH_INDEX).await?;

        for id in ids {
            let agent_id = AgentId::new(id);
            let _guard = self.write_lock.lock().await;
            let now = Utc::now();
            let key = keys::health(&agent_id);

            let Some(mut record) = load_json::<HealthRecord>(self.store.as_ref(), &key).await?
            else {
                self.store
                    .set_remove(keys::HEALTH_INDEX, agent_id.as_str())
                    .await?;
                continue;
            };

            if is_stale(record.last_seen, now, self.config.record_retention()) {
                self.store.delete(&key).await?;
                self.store
                    .set_remove(keys::HEALTH_INDEX, agent_id.as_str())
                    .await?;
                self.store.delete(&keys::errors(&agent_id)).await?;
                info!(agent_id = %agent_id, last_seen = %record.last_seen, "Purged expired health record");
                report.purged += 1;
                continue;
            }

            let reaped = self.reap_in_flight(&mut record, now);
            let previous = self.refresh(&mut record, now);
            if reaped > 0 || previous.is_some() {
                save_json(self.store.as_ref(), &key, &record).await?;
            }
            if previous.is_some() {
                self.emit_transition(&record, previous, now);
                report.transitions += 1;
            }
            report.reaped += reaped;
        }

        if report.transitions > 0 || report.purged > 0 || report.reaped > 0 {
            debug!(
                transitions = report.transitions,
                purged = report.purged,
                reaped = report.reaped,
                "Health status sweep finished"
            );
        }
        Ok(report)
    }

    /// Forget tasks whose completion never arrived. Returns how many were
    /// dropped.
    fn reap_in_flight(&self, record: &mut HealthRecord, now: DateTime<Utc>) -> usize {
        let timeout = self.config.in_flight_timeout();
        let agent_id = record.agent_id.clone();
        let before = record.in_flight.len();
        record.in_flight.retain(|task_id, started| {
            let expired = is_stale(*started, now, timeout);
            if expired {
                warn!(
                    agent_id = %agent_id,
                    task_id = %task_id,
                    started = %started,
                    "In-flight task timed out without a completion, releasing its slot"
                );
            }
            !expired
        });
        let reaped = before - record.in_flight.len();
        if reaped > 0 {
            record.current_load = in_flight_load(record);
        }
        reaped
    }

    /// Recompute score and status. Returns the previous status when it
    /// changed.
    fn refresh(&self, record: &mut HealthRecord, now: DateTime<Utc>) -> Option<HealthStatus> {
        record.health_score = compute_score(record, &self.config);
        let previous = record.status;
        record.status = derive_status(record, now, self.config.offline_threshold());
        (previous != record.status).then_some(previous)
    }

    fn emit_transition(
        &self,
        record: &HealthRecord,
        previous: Option<HealthStatus>,
        now: DateTime<Utc>,
    ) {
        let Some(previous) = previous else {
            return;
        };
        info!(
            agent_id = %record.agent_id,
            from = %previous,
            to = %record.status,
            health_score = record.health_score,
            "Agent health status changed"
        );
        self.emitter
            .emit(Event::HealthStatusChanged(HealthStatusChangedPayload {
                agent_id: record.agent_id.clone(),
                previous,
                current: record.status,
                health_score: record.health_score,
                timestamp: now,
            }));
    }
}

fn in_flight_load(record: &HealthRecord) -> u32 {
    u32::try_from(record.in_flight.len()).unwrap_or(u32::MAX)
}

fn push_bounded<T>(window: &mut VecDeque<T>, item: T, capacity: usize) {
    window.push_back(item);
    while window.len() > capacity.max(1) {
        window.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use switchyard_store::{MemoryEventBus, MemoryStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        bus: Arc<MemoryEventBus>,
        monitor: HealthMonitor,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(MemoryEventBus::new());
        let monitor = HealthMonitor::new(store.clone(), bus.clone(), HealthConfig::default());
        Fixture {
            store,
            bus,
            monitor,
        }
    }

    async fn backdate(store: &MemoryStore, agent_id: &AgentId, secs: i64) {
        let key = keys::health(agent_id);
        let mut record: HealthRecord = load_json(store, &key).await.unwrap().unwrap();
        record.last_seen = record.last_seen - TimeDelta::seconds(secs);
        save_json(store, &key, &record).await.unwrap();
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let f = fixture();
        let id = AgentId::from("a");
        f.monitor.register_agent(&id, "code").await.unwrap();
        f.monitor.record_heartbeat(&id).await.unwrap();
        f.monitor.register_agent(&id, "code").await.unwrap();

        let record = f.monitor.get_agent_health(&id).await.unwrap();
        assert!(record.last_heartbeat.is_some());
        assert_eq!(record.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_new_agent_is_initializing() {
        let f = fixture();
        let id = AgentId::from("a");
        f.monitor
            .register_agent_with_capacity(&id, "code", 3)
            .await
            .unwrap();

        let record = f.monitor.get_agent_health(&id).await.unwrap();
        assert_eq!(record.status, HealthStatus::Initializing);
        assert_eq!(record.max_concurrent_tasks, 3);
        assert_eq!(record.health_score, 1.0);
    }

    #[tokio::test]
    async fn test_unknown_agent_operations_are_dropped() {
        let f = fixture();
        let ghost = AgentId::from("ghost");
        assert!(f.monitor.record_heartbeat(&ghost).await.is_ok());
        assert!(f.monitor.record_task_start(&ghost, TaskId::new()).await.is_ok());
        assert!(
            f.monitor
                .record_task_completion(&ghost, TaskId::new(), true)
                .await
                .is_ok()
        );
        assert!(matches!(
            f.monitor.get_agent_health(&ghost).await,
            Err(Error::AgentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_overload_is_soft() {
        let f = fixture();
        let id = AgentId::from("solo");
        f.monitor
            .register_agent_with_capacity(&id, "code", 1)
            .await
            .unwrap();

        f.monitor.record_task_start(&id, TaskId::new()).await.unwrap();
        f.monitor.record_task_start(&id, TaskId::new()).await.unwrap();
        f.monitor.close().await;

        let record = f.monitor.get_agent_health(&id).await.unwrap();
        assert_eq!(record.current_load, 2);
        assert_eq!(f.bus.history_matching("health.solo.overload").len(), 1);
    }

    #[tokio::test]
    async fn test_completion_updates_counters_and_load() {
        let f = fixture();
        let id = AgentId::from("a");
        f.monitor
            .register_agent_with_capacity(&id, "code", 2)
            .await
            .unwrap();

        let ok = TaskId::new();
        let bad = TaskId::new();
        f.monitor.record_task_start(&id, ok).await.unwrap();
        f.monitor.record_task_start(&id, bad).await.unwrap();
        assert!(f.monitor.record_task_completion(&id, ok, true).await.unwrap());
        assert!(f.monitor.record_task_completion(&id, bad, false).await.unwrap());
        // Completion without a start is not counted.
        assert!(
            !f.monitor
                .record_task_completion(&id, TaskId::new(), false)
                .await
                .unwrap()
        );

        let record = f.monitor.get_agent_health(&id).await.unwrap();
        assert_eq!(record.current_load, 0);
        assert_eq!(record.success_count, 1);
        assert_eq!(record.failure_count, 1);
        assert!(record.in_flight.is_empty());
        assert_eq!(record.recent_response_ms.len(), 2);
        assert!(record.health_score < 1.0);
    }

    #[tokio::test]
    async fn test_duplicate_completion_keeps_other_task_in_flight() {
        let f = fixture();
        let id = AgentId::from("a");
        f.monitor
            .register_agent_with_capacity(&id, "code", 2)
            .await
            .unwrap();

        let first = TaskId::new();
        let second = TaskId::new();
        f.monitor.record_task_start(&id, first).await.unwrap();
        f.monitor.record_task_start(&id, second).await.unwrap();
        assert!(f.monitor.record_task_completion(&id, first, true).await.unwrap());
        assert!(!f.monitor.record_task_completion(&id, first, true).await.unwrap());

        let record = f.monitor.get_agent_health(&id).await.unwrap();
        assert_eq!(record.current_load as usize, record.in_flight.len());
        assert_eq!(record.current_load, 1);
        assert!(record.in_flight.contains_key(&second));
        assert_eq!(record.success_count, 1);
        assert_eq!(record.recent_outcomes.len(), 1);

        f.monitor.close().await;
        assert_eq!(f.bus.history_matching("health.a.task_completed").len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_start_counts_once() {
        let f = fixture();
        let id = AgentId::from("a");
        f.monitor
            .register_agent_with_capacity(&id, "code", 2)
            .await
            .unwrap();

        let task = TaskId::new();
        f.monitor.record_task_start(&id, task).await.unwrap();
        f.monitor.record_task_start(&id, task).await.unwrap();

        let record = f.monitor.get_agent_health(&id).await.unwrap();
        assert_eq!(record.current_load, 1);
    }

    #[tokio::test]
    async fn test_sweep_reaps_lost_completions() {
        let f = fixture();
        let id = AgentId::from("solo");
        f.monitor
            .register_agent_with_capacity(&id, "code", 1)
            .await
            .unwrap();
        f.monitor.record_heartbeat(&id).await.unwrap();

        let lost = TaskId::new();
        let fresh = TaskId::new();
        f.monitor.record_task_start(&id, lost).await.unwrap();
        f.monitor.record_task_start(&id, fresh).await.unwrap();

        let key = keys::health(&id);
        let mut record: HealthRecord = load_json(f.store.as_ref(), &key).await.unwrap().unwrap();
        record.in_flight.insert(lost, Utc::now() - TimeDelta::seconds(1800));
        save_json(f.store.as_ref(), &key, &record).await.unwrap();

        let report = f.monitor.sweep().await.unwrap();
        assert_eq!(report.reaped, 1);

        let record = f.monitor.get_agent_health(&id).await.unwrap();
        assert_eq!(record.current_load, 1);
        assert!(record.in_flight.contains_key(&fresh));
        assert_eq!(record.success_count + record.failure_count, 0);

        // The late completion of the reaped task is not counted.
        assert!(!f.monitor.record_task_completion(&id, lost, true).await.unwrap());
        assert_eq!(f.monitor.sweep().await.unwrap().reaped, 0);
    }

    #[tokio::test]
    async fn test_failures_move_status_down() {
        let f = fixture();
        let id = AgentId::from("flaky");
        f.monitor
            .register_agent_with_capacity(&id, "code", 2)
            .await
            .unwrap();

        for _ in 0..10 {
            let task = TaskId::new();
            f.monitor.record_task_start(&id, task).await.unwrap();
            f.monitor.record_task_completion(&id, task, false).await.unwrap();
        }
        f.monitor.close().await;

        let record = f.monitor.get_agent_health(&id).await.unwrap();
        assert_eq!(record.status, HealthStatus::Unhealthy);
        assert!((record.health_score - 0.5).abs() < 0.01);
        assert!(!f.bus.history_matching("health.flaky.status").is_empty());
    }

    #[tokio::test]
    async fn test_stale_agent_reads_offline() {
        let f = fixture();
        let id = AgentId::from("a");
        f.monitor.register_agent(&id, "code").await.unwrap();
        f.monitor.record_heartbeat(&id).await.unwrap();
        backdate(&f.store, &id, 120).await;

        let record = f.monitor.get_agent_health(&id).await.unwrap();
        assert_eq!(record.status, HealthStatus::Offline);
        assert!(f.monitor.get_healthy_agents(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_publishes_transition_and_purges() {
        let f = fixture();
        let stale = AgentId::from("stale");
        let gone = AgentId::from("gone");
        for id in [&stale, &gone] {
            f.monitor.register_agent(id, "code").await.unwrap();
            f.monitor.record_heartbeat(id).await.unwrap();
        }
        backdate(&f.store, &stale, 120).await;
        backdate(&f.store, &gone, 7200).await;

        let report = f.monitor.sweep().await.unwrap();
        assert_eq!(
            report,
            StatusSweep {
                transitions: 1,
                purged: 1,
                reaped: 0
            }
        );

        // A second sweep finds nothing new.
        let report = f.monitor.sweep().await.unwrap();
        assert_eq!(report, StatusSweep::default());

        f.monitor.close().await;
        let went_offline = f
            .bus
            .history_matching("health.stale.status")
            .into_iter()
            .filter(|e| {
                matches!(e, Event::HealthStatusChanged(p) if p.current == HealthStatus::Offline)
            })
            .count();
        assert_eq!(went_offline, 1);
        assert!(f.monitor.get_agent_health(&gone).await.is_err());
    }

    #[tokio::test]
    async fn test_record_error_is_bounded() {
        let f = fixture();
        let id = AgentId::from("a");
        f.monitor.register_agent(&id, "code").await.unwrap();
        for i in 0..15 {
            f.monitor
                .record_error(&id, &format!("boom {}", i))
                .await
                .unwrap();
        }

        let record = f.monitor.get_agent_health(&id).await.unwrap();
        assert_eq!(record.recent_errors.len(), 10);
        assert_eq!(record.recent_errors.back().map(String::as_str), Some("boom 14"));

        let history = f.monitor.error_history(&id).await.unwrap();
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].1, "boom 5");
    }

    #[tokio::test]
    async fn test_summary_and_remove() {
        let f = fixture();
        let a = AgentId::from("a");
        let b = AgentId::from("b");
        f.monitor.register_agent(&a, "code").await.unwrap();
        f.monitor.register_agent(&b, "review").await.unwrap();
        f.monitor.record_heartbeat(&a).await.unwrap();

        let summary = f.monitor.summary().await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.healthy, 1);
        assert_eq!(summary.initializing, 1);

        let review = f.monitor.get_healthy_agents(Some("review")).await.unwrap();
        assert_eq!(review.len(), 1);

        assert!(f.monitor.remove_agent(&b).await.unwrap());
        assert!(!f.monitor.remove_agent(&b).await.unwrap());
        assert_eq!(f.monitor.summary().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let f = fixture();
        let id = AgentId::from("a");
        f.monitor.register_agent(&id, "code").await.unwrap();
        f.store.set_available(false);

        let err = f.monitor.record_heartbeat(&id).await.unwrap_err();
        assert!(err.is_store_failure());
    }
}
