//! Switchyard Core
//!
//! Domain types, port traits and error handling shared by the health
//! monitor, discovery service, router and orchestrator. This crate has
//! minimal dependencies and defines the vocabulary used across all other
//! crates.

pub mod agent;
pub mod emitter;
pub mod error;
pub mod events;
pub mod health;
pub mod ids;
pub mod keys;
pub mod ports;
pub mod routing;

pub use emitter::EventEmitter;
pub use error::{Error, Result};
pub use ids::*;
