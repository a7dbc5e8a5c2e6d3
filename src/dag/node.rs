// src/dag/node.rs

//! Per-task scheduler state.

use std::collections::BTreeSet;

use crate::task::{GraphResults, Task, TaskKey, TaskOutcome};

/// Lifecycle of a node (internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeState {
    /// Waiting on dependencies.
    Pending,
    /// Dependencies satisfied; waiting for a worker slot.
    Ready,
    /// Handed to a worker.
    Running,
    Done(TaskOutcome),
}

impl NodeState {
    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, NodeState::Done(_))
    }

    pub(crate) fn is_success(self) -> bool {
        matches!(self, NodeState::Done(o) if o.is_success())
    }

    pub(crate) fn is_failed(self) -> bool {
        matches!(self, NodeState::Done(TaskOutcome::Failed))
    }
}

/// Public, read-only view of a task's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunState {
    Pending,
    Ready,
    Running,
    Success,
    Skipped,
    Failed,
}

impl From<NodeState> for TaskRunState {
    fn from(state: NodeState) -> Self {
        match state {
            NodeState::Pending => TaskRunState::Pending,
            NodeState::Ready => TaskRunState::Ready,
            NodeState::Running => TaskRunState::Running,
            NodeState::Done(TaskOutcome::Success) => TaskRunState::Success,
            NodeState::Done(TaskOutcome::Skipped) => TaskRunState::Skipped,
            NodeState::Done(TaskOutcome::Failed) => TaskRunState::Failed,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TaskNode {
    pub key: TaskKey,
    pub task: Task,
    /// Insertion order; FIFO tie-break among ready tasks.
    pub seq: u64,
    pub dependencies: Vec<TaskKey>,
    pub dependants: BTreeSet<TaskKey>,
    pub state: NodeState,
    /// Bumped every time a forced request re-queues a terminal node.
    pub instance: u32,
}

impl TaskNode {
    pub(crate) fn new(key: TaskKey, task: Task, seq: u64, dependencies: Vec<TaskKey>) -> Self {
        Self {
            key,
            task,
            seq,
            dependencies,
            dependants: BTreeSet::new(),
            state: NodeState::Pending,
            instance: 0,
        }
    }
}

/// A task the scheduler wants a worker to process now.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub key: TaskKey,
    pub task: Task,
    /// Results of the direct dependencies.
    pub dependency_results: GraphResults,
    pub instance: u32,
}
