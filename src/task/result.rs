// src/task/result.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::TaskError;
use crate::task::{TaskKey, TaskType};
use crate::types::ActionRef;

/// Terminal outcome of one task instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    /// Status check found the work already done. Counts as success.
    Skipped,
    Failed,
}

impl TaskOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, TaskOutcome::Success | TaskOutcome::Skipped)
    }
}

/// What a successful `process()` produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskOutput {
    pub skipped: bool,
    /// Values other actions can reference via
    /// `${actions.<kind>.<name>.outputs.<key>}`.
    pub outputs: BTreeMap<String, String>,
    /// Set by `ResolveAction` tasks.
    pub resolved_spec: Option<toml::Table>,
}

impl TaskOutput {
    pub fn skipped(outputs: BTreeMap<String, String>) -> Self {
        Self {
            skipped: true,
            outputs,
            resolved_spec: None,
        }
    }

    pub fn with_outputs(outputs: BTreeMap<String, String>) -> Self {
        Self {
            outputs,
            ..Self::default()
        }
    }
}

/// Terminal record of a task, as stored in [`GraphResults`].
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub key: TaskKey,
    pub task_type: TaskType,
    /// Action name, or the label of a process task.
    pub name: String,
    pub action: Option<ActionRef>,
    pub version: Option<String>,
    pub outcome: TaskOutcome,
    pub outputs: BTreeMap<String, String>,
    pub resolved_spec: Option<toml::Table>,
    pub error: Option<TaskError>,
    pub duration_ms: u64,
    /// Results of the task's direct dependencies.
    pub dependency_results: GraphResults,
    /// Which execution of this key produced the result (0 = first).
    pub instance: u32,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn is_failed(&self) -> bool {
        self.outcome == TaskOutcome::Failed
    }
}

/// Task key -> terminal result.
///
/// A key is present iff that task reached a terminal state. Entries are
/// shared (`Arc`) so every submitter of a key sees the same record.
#[derive(Debug, Clone, Default)]
pub struct GraphResults {
    results: BTreeMap<TaskKey, Arc<TaskResult>>,
}

impl GraphResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &TaskKey) -> Option<&Arc<TaskResult>> {
        self.results.get(key)
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.results.contains_key(key)
    }

    pub fn insert(&mut self, result: Arc<TaskResult>) {
        self.results.insert(result.key.clone(), result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &TaskKey> {
        self.results.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TaskKey, &Arc<TaskResult>)> {
        self.results.iter()
    }

    /// Every failure, keyed by task.
    pub fn errors(&self) -> Vec<(&TaskKey, &TaskError)> {
        self.results
            .iter()
            .filter_map(|(k, r)| r.error.as_ref().map(|e| (k, e)))
            .collect()
    }

    pub fn failed_count(&self) -> usize {
        self.results.values().filter(|r| r.is_failed()).count()
    }

    /// The execution result (Build/Deploy/Run/Test) of `action`, if present.
    pub fn find_execution(&self, action: &ActionRef) -> Option<&Arc<TaskResult>> {
        let task_type = TaskType::from(action.kind);
        self.results
            .values()
            .filter(|r| r.task_type == task_type && r.action.as_ref() == Some(action))
            .max_by_key(|r| r.instance)
    }

    /// Subset of results for the given keys.
    pub fn filter<'a>(&self, keys: impl IntoIterator<Item = &'a TaskKey>) -> GraphResults {
        let mut out = GraphResults::new();
        for key in keys {
            if let Some(r) = self.results.get(key) {
                out.insert(r.clone());
            }
        }
        out
    }

    /// Merge `other` in; newer entries replace older ones.
    pub fn extend(&mut self, other: GraphResults) {
        self.results.extend(other.results);
    }

    pub fn into_map(self) -> BTreeMap<TaskKey, Arc<TaskResult>> {
        self.results
    }
}

impl FromIterator<Arc<TaskResult>> for GraphResults {
    fn from_iter<I: IntoIterator<Item = Arc<TaskResult>>>(iter: I) -> Self {
        let mut out = GraphResults::new();
        for r in iter {
            out.insert(r);
        }
        out
    }
}
