//! Task orchestration on top of the Switchyard coordination layer.

pub mod config;
pub mod coordinator;
pub mod heartbeat;
pub mod invoker;
pub mod queue;
pub mod task;

mod orchestrator;

pub use config::OrchestratorConfig;
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use heartbeat::HeartbeatService;
pub use invoker::AgentInvoker;
pub use orchestrator::{Orchestrator, TaskSummary};
pub use task::{TaskEntry, TaskInvocation, TaskSpec, TaskState};
