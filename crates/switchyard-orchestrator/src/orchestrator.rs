//! Task dispatch.

use crate::config::OrchestratorConfig;
use crate::coordinator::Coordinator;
use crate::invoker::AgentInvoker;
use crate::queue::TaskQueue;
use crate::task::{TaskEntry, TaskInvocation, TaskSpec, TaskState};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use switchyard_core::ids::{AgentId, TaskId};
use switchyard_core::routing::RoutingResult;
use switchyard_core::{Error, Result};
use tracing::{debug, error, info, warn};

/// Counts of tasks per lifecycle state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSummary {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Queues tasks, routes them through the coordination layer and reports
/// every outcome back to it.
///
/// A task that cannot be routed ends in `Failed`; it is never dropped. A
/// store outage during routing puts the task back on the queue and returns
/// the error to the caller.
pub struct Orchestrator {
    coordinator: Arc<Coordinator>,
    invoker: Arc<dyn AgentInvoker>,
    config: OrchestratorConfig,
    queue: Mutex<TaskQueue>,
    tasks: Mutex<HashMap<TaskId, TaskEntry>>,
}

impl Orchestrator {
    pub fn new(
        coordinator: Arc<Coordinator>,
        invoker: Arc<dyn AgentInvoker>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            coordinator,
            invoker,
            config,
            queue: Mutex::new(TaskQueue::new()),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Queue a task.
    pub fn submit(&self, spec: TaskSpec) -> TaskId {
        let task_id = TaskId::new();
        let priority = spec.priority;
        debug!(task_id = %task_id, task_type = %spec.task_type, priority, "Task submitted");

        self.table().insert(
            task_id,
            TaskEntry {
                task_id,
                spec,
                state: TaskState::Queued,
                routing: None,
                submitted_at: Utc::now(),
                finished_at: None,
            },
        );
        self.queue().enqueue(task_id, priority);
        task_id
    }

    /// Route and run the highest-priority queued task. Returns its id, or
    /// `None` when the queue is empty.
    pub async fn dispatch_next(&self) -> Result<Option<TaskId>> {
        let Some(queued) = self.queue().dequeue() else {
            return Ok(None);
        };
        let task_id = queued.task_id;
        let Some(spec) = self.table().get(&task_id).map(|t| t.spec.clone()) else {
            warn!(task_id = %task_id, "Queued task has no entry, skipping");
            return Ok(Some(task_id));
        };

        let request = spec.routing_request(
            task_id,
            self.config.default_max_retries,
            self.config.default_timeout_seconds,
        );
        let routing = match self.coordinator.route_with_retry(&request).await {
            Ok(routing) => routing,
            Err(e) => {
                error!(task_id = %task_id, error = %e, "Routing aborted, task requeued");
                self.queue().requeue_front(queued);
                return Err(e);
            }
        };

        let routed_to = routing.agent_id.clone().filter(|_| routing.success);
        let agent_id = match routed_to {
            Some(agent_id) => agent_id,
            None => {
                let reason = format!(
                    "no agent available for this task type ({}): {}",
                    spec.task_type,
                    routing.error_message.clone().unwrap_or_default()
                );
                warn!(task_id = %task_id, task_type = %spec.task_type, "Task failed: no agent available");
                self.finish(task_id, TaskState::Failed { reason, agent_id: None }, Some(routing));
                return Ok(Some(task_id));
            }
        };

        self.update(task_id, |entry| {
            entry.state = TaskState::Running {
                agent_id: agent_id.clone(),
            };
            entry.routing = Some(routing);
        });

        match self.run_on_agent(task_id, &agent_id, &spec).await {
            Ok(state) => {
                self.finish(task_id, state, None);
                Ok(Some(task_id))
            }
            Err(e) => {
                let state = TaskState::Failed {
                    reason: e.to_string(),
                    agent_id: Some(agent_id),
                };
                self.finish(task_id, state, None);
                Err(e)
            }
        }
    }

    /// Dispatch until the queue is empty. Returns how many tasks were
    /// dispatched.
    pub async fn run_until_idle(&self) -> Result<usize> {
        let mut dispatched = 0;
        while self.dispatch_next().await?.is_some() {
            dispatched += 1;
        }
        Ok(dispatched)
    }

    pub fn task(&self, task_id: TaskId) -> Option<TaskEntry> {
        self.table().get(&task_id).cloned()
    }

    /// All known tasks in submission order.
    pub fn tasks(&self) -> Vec<TaskEntry> {
        let mut entries: Vec<TaskEntry> = self.table().values().cloned().collect();
        entries.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        entries
    }

    pub fn queue_len(&self) -> usize {
        self.queue().len()
    }

    pub fn summary(&self) -> TaskSummary {
        let mut summary = TaskSummary::default();
        for entry in self.table().values() {
            match entry.state {
                TaskState::Queued => summary.queued += 1,
                TaskState::Running { .. } => summary.running += 1,
                TaskState::Completed { .. } => summary.completed += 1,
                TaskState::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }

    async fn run_on_agent(
        &self,
        task_id: TaskId,
        agent_id: &AgentId,
        spec: &TaskSpec,
    ) -> Result<TaskState> {
        self.coordinator.record_task_start(agent_id, task_id).await?;

        let invocation = TaskInvocation {
            task_id,
            task_type: spec.task_type.clone(),
            payload: spec.payload.clone(),
        };
        let timeout = self.config.invocation_timeout();
        let outcome = match tokio::time::timeout(timeout, self.invoker.invoke(agent_id, &invocation)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Timeout {
                millis: timeout.as_millis() as u64,
            }),
        };

        let success = outcome.is_ok();
        self.coordinator
            .record_task_completion(agent_id, task_id, success)
            .await?;

        match outcome {
            Ok(output) => {
                info!(task_id = %task_id, agent_id = %agent_id, "Task completed");
                Ok(TaskState::Completed {
                    agent_id: agent_id.clone(),
                    output,
                })
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(task_id = %task_id, agent_id = %agent_id, error = %reason, "Task failed on agent");
                self.coordinator
                    .health()
                    .record_error(agent_id, &reason)
                    .await?;
                Ok(TaskState::Failed {
                    reason,
                    agent_id: Some(agent_id.clone()),
                })
            }
        }
    }

    fn finish(
        &self,
        task_id: TaskId,
        state: TaskState,
        routing: Option<RoutingResult>,
    ) {
        self.update(task_id, |entry| {
            entry.state = state;
            if routing.is_some() {
                entry.routing = routing;
            }
            entry.finished_at = Some(Utc::now());
        });
    }

    fn update(&self, task_id: TaskId, apply: impl FnOnce(&mut TaskEntry)) {
        if let Some(entry) = self.table().get_mut(&task_id) {
            apply(entry);
        }
    }

    fn queue(&self) -> MutexGuard<'_, TaskQueue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn table(&self) -> MutexGuard<'_, HashMap<TaskId, TaskEntry>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}
