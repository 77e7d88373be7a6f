//! Switchyard Health
//!
//! Tracks per-agent liveness, load and task outcomes, and condenses them
//! into a health score and a derived status that the router consults.

pub mod config;
mod monitor;
pub mod score;

pub use config::{HealthConfig, ScoreWeights};
pub use monitor::{HealthMonitor, StatusSweep};
