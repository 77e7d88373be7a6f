//! Integration test infrastructure for Switchyard.
//!
//! In-process scenarios run against [`MemoryStore`](switchyard_store::MemoryStore)
//! and [`MemoryEventBus`](switchyard_store::MemoryEventBus). Tests gated on
//! the `integration` feature start a NATS container through testcontainers.
//!
//! # Usage
//!
//! ```ignore
//! use switchyard_tests::TestContext;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let ctx = TestContext::new().await;
//!     // Use ctx.coordinator, ctx.bus, ctx.store
//! }
//! ```

pub mod containers;
pub mod context;
pub mod fixtures;

pub use context::TestContext;
pub use fixtures::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,switchyard_tests=debug")),
        )
        .with_test_writer()
        .try_init();
}
