//! Priority queue for tasks waiting to be routed.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use switchyard_core::ids::TaskId;

/// A task waiting for dispatch.
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub task_id: TaskId,
    pub priority: i32,
    /// Submission order, for FIFO within a priority.
    sequence: u64,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.task_id == other.task_id
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then earlier submission
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            other => other,
        }
    }
}

/// Tasks ordered by priority, FIFO within a priority.
#[derive(Debug, Default)]
pub struct TaskQueue {
    queue: BinaryHeap<QueuedTask>,
    next_sequence: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task to the back of its priority band.
    pub fn enqueue(&mut self, task_id: TaskId, priority: i32) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push(QueuedTask {
            task_id,
            priority,
            sequence,
        });
    }

    /// Put a task back at the front of its priority band.
    pub fn requeue_front(&mut self, task: QueuedTask) {
        self.queue.push(task);
    }

    /// Next task to dispatch.
    pub fn dequeue(&mut self) -> Option<QueuedTask> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Position of a task in dispatch order.
    pub fn position(&self, task_id: TaskId) -> Option<usize> {
        let mut sorted: Vec<_> = self.queue.iter().collect();
        sorted.sort_by(|a, b| b.cmp(a));
        sorted.iter().position(|t| t.task_id == task_id)
    }
}
