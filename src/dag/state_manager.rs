// src/dag/state_manager.rs

//! Readiness evaluation and failure propagation between nodes.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::dag::node::{NodeState, TaskNode};
use crate::dag::scheduler_step::SchedulerStep;
use crate::errors::TaskError;
use crate::task::{GraphResults, TaskKey, TaskOutcome, TaskResult};

/// Outcome of checking a pending node's dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Readiness {
    Waiting,
    Ready,
    /// The named dependency failed.
    Blocked(TaskKey),
}

/// Borrowed view over the scheduler's mutable state.
pub(crate) struct StateManager<'a> {
    nodes: &'a mut HashMap<TaskKey, TaskNode>,
    ready: &'a mut BTreeSet<(u64, TaskKey)>,
    results: &'a mut GraphResults,
}

impl<'a> StateManager<'a> {
    pub(crate) fn new(
        nodes: &'a mut HashMap<TaskKey, TaskNode>,
        ready: &'a mut BTreeSet<(u64, TaskKey)>,
        results: &'a mut GraphResults,
    ) -> Self {
        Self {
            nodes,
            ready,
            results,
        }
    }

    pub(crate) fn readiness(&self, node: &TaskNode) -> Readiness {
        let mut all_done = true;
        for dep_key in &node.dependencies {
            let Some(dep) = self.nodes.get(dep_key) else {
                warn!(task = %node.key, dep = %dep_key, "dependency missing from graph");
                return Readiness::Waiting;
            };
            if dep.state.is_failed() {
                return Readiness::Blocked(dep_key.clone());
            }
            if !dep.state.is_success() {
                all_done = false;
            }
        }
        if all_done {
            Readiness::Ready
        } else {
            Readiness::Waiting
        }
    }

    /// Re-evaluate the given pending nodes: move them to `Ready` or fail them
    /// (and their dependants) when a dependency failed.
    pub(crate) fn promote<I>(&mut self, keys: I, step: &mut SchedulerStep)
    where
        I: IntoIterator<Item = TaskKey>,
    {
        for key in keys {
            let Some(node) = self.nodes.get(&key) else {
                continue;
            };
            if node.state != NodeState::Pending {
                continue;
            }
            match self.readiness(node) {
                Readiness::Waiting => {}
                Readiness::Ready => {
                    if let Some(node) = self.nodes.get_mut(&key) {
                        node.state = NodeState::Ready;
                        self.ready.insert((node.seq, key.clone()));
                        debug!(task = %key, "dependencies satisfied; marking Ready");
                        step.newly_ready.push(key);
                    }
                }
                Readiness::Blocked(dependency) => {
                    self.fail_with_dependency(&key, dependency, step);
                }
            }
        }
    }

    /// Fail a not-yet-started node because `dependency` failed, then every
    /// not-yet-started node depending on it, transitively. Their `process()`
    /// never runs.
    pub(crate) fn fail_with_dependency(
        &mut self,
        key: &TaskKey,
        dependency: TaskKey,
        step: &mut SchedulerStep,
    ) {
        let mut stack = vec![(key.clone(), dependency)];

        while let Some((key, dependency)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&key) else {
                continue;
            };
            if !matches!(node.state, NodeState::Pending | NodeState::Ready) {
                continue;
            }
            if node.state == NodeState::Ready {
                self.ready.remove(&(node.seq, key.clone()));
            }
            node.state = NodeState::Done(TaskOutcome::Failed);
            debug!(
                task = %key,
                dependency = %dependency,
                "marking dependant as failed due to upstream failure"
            );

            let dependants: Vec<TaskKey> = node.dependants.iter().cloned().collect();
            let error = TaskError::DependencyFailed { dependency };
            let result = build_failed_result(node, error, self.results);
            self.results.insert(Arc::new(result));

            step.newly_failed.push(key.clone());
            step.completed.push(key.clone());

            for dependant in dependants {
                stack.push((dependant, key.clone()));
            }
        }
    }

    /// Move `Ready` dependants of a re-queued node back to `Pending`.
    pub(crate) fn demote_dependants(&mut self, key: &TaskKey) {
        let dependants: Vec<TaskKey> = match self.nodes.get(key) {
            Some(node) => node.dependants.iter().cloned().collect(),
            None => return,
        };
        for dependant in dependants {
            if let Some(node) = self.nodes.get_mut(&dependant) {
                if node.state == NodeState::Ready {
                    self.ready.remove(&(node.seq, dependant.clone()));
                    node.state = NodeState::Pending;
                    debug!(task = %dependant, "dependency re-queued; back to Pending");
                }
            }
        }
    }
}

/// Terminal failed result for a node that never ran.
pub(crate) fn build_failed_result(
    node: &TaskNode,
    error: TaskError,
    results: &GraphResults,
) -> TaskResult {
    let action = node.task.action();
    TaskResult {
        key: node.key.clone(),
        task_type: node.task.task_type(),
        name: node.task.name().to_string(),
        action: action.map(|a| a.reference()),
        version: action.map(|a| a.version.clone()),
        outcome: TaskOutcome::Failed,
        outputs: Default::default(),
        resolved_spec: None,
        error: Some(error),
        duration_ms: 0,
        dependency_results: results.filter(&node.dependencies),
        instance: node.instance,
    }
}
