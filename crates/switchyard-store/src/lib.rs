//! In-process backends for Switchyard's store and event ports.

mod bus;
mod memory;
pub mod metrics;

pub use bus::MemoryEventBus;
pub use memory::MemoryStore;
pub use metrics::{BusMetrics, BusMetricsSnapshot, StoreMetrics, StoreMetricsSnapshot};
