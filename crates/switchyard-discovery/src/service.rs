//! Discovery service.

use crate::config::DiscoveryConfig;
use crate::query::{AgentQuery, rank};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use switchyard_core::agent::{AgentRecord, AgentRegistration};
use switchyard_core::events::{
    AgentDeregisteredPayload, AgentExpiredPayload, AgentRegisteredPayload, Event,
};
use switchyard_core::ids::AgentId;
use switchyard_core::ports::{CoordinationStore, EventBus, load_json, save_json};
use switchyard_core::{Error, EventEmitter, Result, keys};
use switchyard_health::HealthMonitor;
use switchyard_health::score::is_stale;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Registry totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub total_agents: usize,
    /// Agents per declared capability.
    pub capabilities: BTreeMap<String, usize>,
    /// Agents per agent type.
    pub agent_types: BTreeMap<String, usize>,
}

/// Owns agent records and their reverse indexes.
///
/// Only this component writes `agent:{id}` records and the
/// `capability:`, `tag:` and `type:` index sets. Registration,
/// deregistration and expiry run under one lock so they appear as a single
/// operation to every caller in this process.
pub struct DiscoveryService {
    store: Arc<dyn CoordinationStore>,
    health: Arc<HealthMonitor>,
    emitter: EventEmitter,
    config: DiscoveryConfig,
    write_lock: tokio::sync::Mutex<()>,
    shutdown_tx: watch::Sender<bool>,
    cleaner: Mutex<Option<JoinHandle<()>>>,
}

impl DiscoveryService {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        bus: Arc<dyn EventBus>,
        health: Arc<HealthMonitor>,
        config: DiscoveryConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            health,
            emitter: EventEmitter::new("discovery", bus),
            config,
            write_lock: tokio::sync::Mutex::new(()),
            shutdown_tx,
            cleaner: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Start event delivery and the cleanup sweep.
    pub fn init(self: &Arc<Self>) {
        self.emitter.start();

        let mut guard = self.cleaner.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            return;
        }

        let service = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();
        *guard = Some(tokio::spawn(async move {
            let mut ticker = interval(service.config.cleanup_interval());
            info!(
                interval_secs = service.config.cleanup_interval_secs,
                agent_timeout_secs = service.config.agent_timeout_secs,
                "Starting discovery cleanup sweep"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = service.cleanup_expired().await {
                            error!(error = %e, "Discovery cleanup sweep failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("Discovery cleanup sweep shutting down");
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
        let handle = self.cleaner.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Discovery cleanup sweep panicked");
            }
        }
        self.emitter.close().await;
    }

    /// Create or overwrite an agent. Index entries the previous registration
    /// declared but this one does not are removed.
    pub async fn register_agent(&self, registration: AgentRegistration) -> Result<AgentRecord> {
        registration.validate()?;

        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let key = keys::agent(&registration.agent_id);
        let previous = load_json::<AgentRecord>(self.store.as_ref(), &key).await?;
        let record = AgentRecord::from_registration(registration, now);
        let id = record.agent_id.as_str();

        let wanted = index_entries(&record);
        if let Some(previous) = &previous {
            for stale in index_entries(previous).difference(&wanted) {
                self.store.set_remove(stale, id).await?;
            }
        }

        save_json(self.store.as_ref(), &key, &record).await?;
        self.store.set_add(keys::AGENTS, id).await?;
        for entry in &wanted {
            self.store.set_add(entry, id).await?;
        }

        self.health
            .register_agent_with_capacity(
                &record.agent_id,
                &record.agent_type,
                record.max_concurrent_tasks,
            )
            .await?;

        info!(
            agent_id = %record.agent_id,
            agent_type = %record.agent_type,
            capabilities = ?record.capabilities,
            replaced = previous.is_some(),
            "Agent registered"
        );
        self.emitter.emit(Event::AgentRegistered(AgentRegisteredPayload {
            agent_id: record.agent_id.clone(),
            agent_type: record.agent_type.clone(),
            capabilities: record.capabilities.iter().cloned().collect(),
            version: record.version.clone(),
            replaced: previous.is_some(),
            timestamp: now,
        }));

        Ok(record)
    }

    /// Remove an agent and all of its index entries.
    pub async fn deregister_agent(&self, agent_id: &AgentId) -> Result<AgentRecord> {
        let _guard = self.write_lock.lock().await;
        let record = load_json::<AgentRecord>(self.store.as_ref(), &keys::agent(agent_id))
            .await?
            .ok_or_else(|| Error::AgentNotFound(agent_id.to_string()))?;

        self.remove_record(&record).await?;

        info!(agent_id = %agent_id, "Agent deregistered");
        self.emitter
            .emit(Event::AgentDeregistered(AgentDeregisteredPayload {
                agent_id: agent_id.clone(),
                agent_type: record.agent_type.clone(),
                timestamp: Utc::now(),
            }));
        Ok(record)
    }

    pub async fn get_agent(&self, agent_id: &AgentId) -> Result<AgentRecord> {
        load_json::<AgentRecord>(self.store.as_ref(), &keys::agent(agent_id))
            .await?
            .ok_or_else(|| Error::AgentNotFound(agent_id.to_string()))
    }

    /// Every registered agent, ordered by id.
    pub async fn list_agents(&self) -> Result<Vec<AgentRecord>> {
        let ids = self.store.set_members(keys::AGENTS).await?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let agent_id = AgentId::new(id);
            match load_json::<AgentRecord>(self.store.as_ref(), &keys::agent(&agent_id)).await? {
                Some(record) => records.push(record),
                None => {
                    self.heal_dangling(&agent_id, &[keys::AGENTS.to_string()])
                        .await?
                }
            }
        }
        Ok(records)
    }

    /// Ids of agents declaring every required capability, best first.
    pub async fn find_agents_by_capability(
        &self,
        required_capabilities: &BTreeSet<String>,
        preferred_tags: &BTreeSet<String>,
    ) -> Result<Vec<AgentId>> {
        if required_capabilities.is_empty() {
            return Err(Error::InvalidRequest(
                "at least one capability is required".to_string(),
            ));
        }
        let query = AgentQuery {
            required_capabilities: required_capabilities.clone(),
            preferred_tags: preferred_tags.clone(),
            agent_type: None,
        };
        Ok(self
            .find_agent_records(&query)
            .await?
            .into_iter()
            .map(|r| r.agent_id)
            .collect())
    }

    /// Ranked records matching a query.
    pub async fn find_agent_records(&self, query: &AgentQuery) -> Result<Vec<AgentRecord>> {
        query.validate()?;

        let mut index_keys: Vec<String> = query
            .required_capabilities
            .iter()
            .map(|c| keys::capability(c))
            .collect();
        if let Some(agent_type) = &query.agent_type {
            index_keys.push(keys::agent_type(agent_type));
        }

        let mut candidates: Option<BTreeSet<String>> = None;
        for key in &index_keys {
            let members = self.store.set_members(key).await?;
            candidates = Some(match candidates {
                Some(acc) => acc.intersection(&members).cloned().collect(),
                None => members,
            });
            if candidates.as_ref().is_some_and(BTreeSet::is_empty) {
                break;
            }
        }

        let mut records = Vec::new();
        for id in candidates.unwrap_or_default() {
            let agent_id = AgentId::new(id);
            match load_json::<AgentRecord>(self.store.as_ref(), &keys::agent(&agent_id)).await? {
                Some(record) if query.matches(&record) => records.push(record),
                Some(record) => {
                    debug!(agent_id = %record.agent_id, "Index entry disagrees with record, skipping");
                }
                None => self.heal_dangling(&agent_id, &index_keys).await?,
            }
        }

        rank(&mut records, &query.preferred_tags);
        Ok(records)
    }

    pub async fn find_agents_by_type(&self, agent_type: &str) -> Result<Vec<AgentRecord>> {
        self.find_agent_records(&AgentQuery::of_type(agent_type))
            .await
    }

    /// Ids of agents carrying a tag, ordered by id. Index members are
    /// checked against the stored record, since distinct tags can share a
    /// sanitised index key.
    pub async fn find_agents_by_tag(&self, tag: &str) -> Result<Vec<AgentId>> {
        let index_key = keys::tag(tag);
        let mut found = Vec::new();
        for id in self.store.set_members(&index_key).await? {
            let agent_id = AgentId::new(id);
            match load_json::<AgentRecord>(self.store.as_ref(), &keys::agent(&agent_id)).await? {
                Some(record) if record.tags.contains(tag) => found.push(agent_id),
                Some(_) => {
                    debug!(agent_id = %agent_id, tag, "Tag index entry disagrees with record, skipping");
                }
                None => {
                    self.heal_dangling(&agent_id, std::slice::from_ref(&index_key))
                        .await?
                }
            }
        }
        Ok(found)
    }

    /// Best ranked agent of a type that the health monitor considers able to
    /// take work (not OFFLINE or UNHEALTHY).
    pub async fn find_best_agent(
        &self,
        agent_type: &str,
        required_capabilities: &BTreeSet<String>,
    ) -> Result<Option<AgentRecord>> {
        let query = AgentQuery {
            required_capabilities: required_capabilities.clone(),
            preferred_tags: BTreeSet::new(),
            agent_type: Some(agent_type.to_string()),
        };

        for record in self.find_agent_records(&query).await? {
            match self.health.get_agent_health(&record.agent_id).await {
                Ok(health) if health.status.is_available() => return Ok(Some(record)),
                Ok(health) => {
                    debug!(agent_id = %record.agent_id, status = %health.status, "Skipping unavailable agent");
                }
                Err(Error::AgentNotFound(_)) => {
                    debug!(agent_id = %record.agent_id, "Skipping agent without health record");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Mirror a heartbeat into the record's `last_seen`. Unknown agents are
    /// logged and ignored.
    pub async fn touch(&self, agent_id: &AgentId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let key = keys::agent(agent_id);
        let Some(mut record) = load_json::<AgentRecord>(self.store.as_ref(), &key).await? else {
            debug!(agent_id = %agent_id, "Touch for unknown agent, ignoring");
            return Ok(());
        };
        record.last_seen = Utc::now();
        save_json(self.store.as_ref(), &key, &record).await
    }

    pub async fn stats(&self) -> Result<DiscoveryStats> {
        let mut stats = DiscoveryStats::default();
        for record in self.list_agents().await? {
            stats.total_agents += 1;
            *stats.agent_types.entry(record.agent_type.clone()).or_default() += 1;
            for capability in &record.capabilities {
                *stats.capabilities.entry(capability.clone()).or_default() += 1;
            }
        }
        Ok(stats)
    }

    /// Remove agents unseen for longer than the agent timeout. Each agent is
    /// re-checked under the write lock, so a registration that lands first
    /// keeps the agent alive. Returns the expired ids.
    pub async fn cleanup_expired(&self) -> Result<Vec<AgentId>> {
        let mut expired = Vec::new();
        let ids = self.store.set_members(keys::AGENTS).await?;

        for id in ids {
            let agent_id = AgentId::new(id);
            let _guard = self.write_lock.lock().await;
            let now = Utc::now();

            let Some(record) =
                load_json::<AgentRecord>(self.store.as_ref(), &keys::agent(&agent_id)).await?
            else {
                self.store.set_remove(keys::AGENTS, agent_id.as_str()).await?;
                continue;
            };

            let last_seen = self.last_seen(&record).await?;
            if !is_stale(last_seen, now, self.config.agent_timeout()) {
                continue;
            }

            self.remove_record(&record).await?;
            warn!(agent_id = %agent_id, last_seen = %last_seen, "Agent expired");
            self.emitter.emit(Event::AgentExpired(AgentExpiredPayload {
                agent_id: agent_id.clone(),
                last_seen,
                timestamp: now,
            }));
            expired.push(agent_id);
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Discovery cleanup removed expired agents");
        }
        Ok(expired)
    }

    /// Freshest sighting from either the record or the health monitor.
    async fn last_seen(&self, record: &AgentRecord) -> Result<DateTime<Utc>> {
        match self.health.get_agent_health(&record.agent_id).await {
            Ok(health) => Ok(health.last_seen.max(record.last_seen)),
            Err(Error::AgentNotFound(_)) => Ok(record.last_seen),
            Err(e) => Err(e),
        }
    }

    async fn remove_record(&self, record: &AgentRecord) -> Result<()> {
        let id = record.agent_id.as_str();
        for entry in index_entries(record) {
            self.store.set_remove(&entry, id).await?;
        }
        self.store.set_remove(keys::AGENTS, id).await?;
        self.store.delete(&keys::agent(&record.agent_id)).await?;
        Ok(())
    }

    /// Drop index entries that point at a record that no longer exists.
    async fn heal_dangling(&self, agent_id: &AgentId, index_keys: &[String]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.store.get(&keys::agent(agent_id)).await?.is_some() {
            return Ok(());
        }
        for key in index_keys {
            self.store.set_remove(key, agent_id.as_str()).await?;
        }
        debug!(agent_id = %agent_id, "Removed dangling index entries");
        Ok(())
    }
}

fn index_entries(record: &AgentRecord) -> BTreeSet<String> {
    let mut entries: BTreeSet<String> = record
        .capabilities
        .iter()
        .map(|c| keys::capability(c))
        .collect();
    entries.extend(record.tags.iter().map(|t| keys::tag(t)));
    entries.insert(keys::agent_type(&record.agent_type));
    entries
}
