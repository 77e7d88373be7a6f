//! Switchyard Discovery
//!
//! The agent registry: records, capability/tag/type reverse indexes,
//! ranked capability lookup and expiry of crashed agents.

pub mod config;
mod query;
mod service;

pub use config::DiscoveryConfig;
pub use query::{AgentQuery, rank};
pub use service::{DiscoveryService, DiscoveryStats};
