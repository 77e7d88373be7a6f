//! Switchyard Router
//!
//! Chooses one agent per task from discovery's capability matches, using a
//! pluggable strategy over health snapshots, and keeps a circuit breaker per
//! agent so repeatedly failing agents stop receiving work.

pub mod breaker;
pub mod config;
mod router;
pub mod strategies;

pub use breaker::CircuitBreakerState;
pub use config::{BreakerConfig, RouterConfig};
pub use router::{Router, RouterStats};
