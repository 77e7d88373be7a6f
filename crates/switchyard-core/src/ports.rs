//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the coordination components
//! and the shared store / event transport they are handed at construction.

use crate::events::Event;
use crate::Result;
use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::pin::Pin;

/// Stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event>> + Send>>;

/// Event bus for publishing and subscribing to events.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event.
    async fn publish(&self, event: Event) -> Result<()>;

    /// Subscribe to events matching a pattern.
    /// Pattern supports wildcards: `health.*.status`, `routing.>`
    async fn subscribe(&self, pattern: &str) -> Result<EventStream>;
}

/// Shared key-value store holding agent, health and breaker records.
///
/// Every method is atomic on its own; callers composing several calls get
/// no transaction and must tolerate interleaving. Implementations report an
/// unreachable backend as `Error::StoreUnavailable`.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Read a string value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a string value, replacing any previous one.
    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Delete a value. Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// List value keys starting with a prefix.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Add a member to a set. Returns whether it was newly added.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool>;

    /// Remove a member from a set. Returns whether it was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool>;

    /// All members of a set (empty when the set does not exist).
    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>>;

    /// Append to a list, keeping at most `max_len` newest entries.
    async fn append(&self, key: &str, entry: String, max_len: usize) -> Result<()>;

    /// Up to `limit` newest list entries, oldest first.
    async fn range(&self, key: &str, limit: usize) -> Result<Vec<String>>;
}

/// Read and decode a JSON value.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn CoordinationStore,
    key: &str,
) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encode and write a JSON value.
pub async fn save_json<T: Serialize + Sync>(
    store: &dyn CoordinationStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, raw).await
}
