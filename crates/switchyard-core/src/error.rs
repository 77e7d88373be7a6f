//! Error types for Switchyard.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Registry errors
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),

    // Routing errors
    #[error("No eligible candidate: {0}")]
    NoEligibleCandidate(String),

    #[error("Invalid routing request: {0}")]
    InvalidRequest(String),

    #[error("Agent {agent_id} overloaded ({current_load}/{max_concurrent_tasks})")]
    Overload {
        agent_id: String,
        current_load: u32,
        max_concurrent_tasks: u32,
    },

    #[error("Timed out after {millis} ms")]
    Timeout { millis: u64 },

    // Infrastructure errors
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Event bus error: {0}")]
    EventBus(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Agent invocation failed: {0}")]
    Invocation(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error means the shared store cannot be trusted right now.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
