//! In-process coordination store.

use async_trait::async_trait;
use switchyard_core::ports::CoordinationStore;
use switchyard_core::{Error, Result};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::metrics::StoreMetrics;

#[derive(Default)]
struct Inner {
    values: HashMap<String, String>,
    sets: HashMap<String, BTreeSet<String>>,
    lists: HashMap<String, VecDeque<String>>,
}

/// `CoordinationStore` kept in process memory.
///
/// Each primitive takes the lock once, so individual calls are atomic.
/// Used for single-process deployments and as the fake store in tests.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    available: AtomicBool,
    metrics: StoreMetrics,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            available: AtomicBool::new(true),
            metrics: StoreMetrics::default(),
        }
    }

    /// Simulate the backend going away (or coming back). While unavailable
    /// every call fails with `StoreUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    fn check(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            self.metrics.record_failure();
            Err(Error::StoreUnavailable(
                "memory store marked unavailable".to_string(),
            ))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        self.metrics.record_read();
        Ok(self.inner.read().await.values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.check()?;
        self.metrics.record_write();
        self.inner
            .write()
            .await
            .values
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check()?;
        self.metrics.record_write();
        let mut inner = self.inner.write().await;
        let removed_value = inner.values.remove(key).is_some();
        let removed_list = inner.lists.remove(key).is_some();
        Ok(removed_value || removed_list)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.check()?;
        self.metrics.record_read();
        let inner = self.inner.read().await;
        let mut keys: Vec<String> = inner
            .values
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        self.check()?;
        self.metrics.record_write();
        Ok(self
            .inner
            .write()
            .await
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        self.check()?;
        self.metrics.record_write();
        let mut inner = self.inner.write().await;
        let Some(set) = inner.sets.get_mut(key) else {
            return Ok(false);
        };
        let removed = set.remove(member);
        if set.is_empty() {
            inner.sets.remove(key);
        }
        Ok(removed)
    }

    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>> {
        self.check()?;
        self.metrics.record_read();
        Ok(self
            .inner
            .read()
            .await
            .sets
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, key: &str, entry: String, max_len: usize) -> Result<()> {
        self.check()?;
        self.metrics.record_write();
        let mut inner = self.inner.write().await;
        let list = inner.lists.entry(key.to_string()).or_default();
        list.push_back(entry);
        while list.len() > max_len.max(1) {
            list.pop_front();
        }
        Ok(())
    }

    async fn range(&self, key: &str, limit: usize) -> Result<Vec<String>> {
        self.check()?;
        self.metrics.record_read();
        let inner = self.inner.read().await;
        let Some(list) = inner.lists.get(key) else {
            return Ok(vec![]);
        };
        let skip = list.len().saturating_sub(limit);
        Ok(list.iter().skip(skip).cloned().collect())
    }
}
