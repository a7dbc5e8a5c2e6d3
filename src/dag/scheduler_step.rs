// src/dag/scheduler_step.rs

//! Step-by-step result type for the scheduler.

use crate::task::TaskKey;

/// Structured result of a single scheduler "step".
///
/// Tests use it to step the graph manually and assert on what changed; the
/// runtime uses `completed` to settle pending submissions.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks whose dependencies became satisfied in this step.
    pub newly_ready: Vec<TaskKey>,
    /// Tasks that failed in this step, including dependants failed by
    /// propagation.
    pub newly_failed: Vec<TaskKey>,
    /// Every task that reached a terminal state in this step.
    pub completed: Vec<TaskKey>,
}

impl SchedulerStep {
    pub fn is_empty(&self) -> bool {
        self.newly_ready.is_empty() && self.newly_failed.is_empty() && self.completed.is_empty()
    }

    pub(crate) fn absorb(&mut self, other: SchedulerStep) {
        self.newly_ready.extend(other.newly_ready);
        self.newly_failed.extend(other.newly_failed);
        self.completed.extend(other.completed);
    }
}
