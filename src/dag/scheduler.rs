// src/dag/scheduler.rs

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dag::node::{NodeState, ScheduledTask, TaskNode, TaskRunState};
use crate::dag::resolver::Expansion;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::StateManager;
use crate::errors::TaskError;
use crate::task::{GraphResults, TaskKey, TaskOutcome, TaskOutput, TaskResult};

/// Pure, synchronous scheduler over a growing graph of tasks.
///
/// It is responsible for:
/// - merging expansions into the graph (de-duplicating by task key)
/// - tracking `pending -> ready -> running -> done` per task
/// - handing out ready tasks in insertion order, bounded by `concurrency`
/// - recording results and failing dependants of failed tasks
///
/// It performs no IO; the async runtime drives it.
#[derive(Debug)]
pub struct Scheduler {
    nodes: HashMap<TaskKey, TaskNode>,
    ready: BTreeSet<(u64, TaskKey)>,
    results: GraphResults,
    concurrency: usize,
    running: usize,
    next_seq: u64,
}

impl Scheduler {
    pub fn new(concurrency: usize) -> Self {
        Self {
            nodes: HashMap::new(),
            ready: BTreeSet::new(),
            results: GraphResults::new(),
            concurrency: concurrency.max(1),
            running: 0,
            next_seq: 0,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Number of tasks currently handed out to workers.
    pub fn running_count(&self) -> usize {
        self.running
    }

    /// No task is pending, ready or running.
    pub fn is_idle(&self) -> bool {
        self.running == 0 && !self.nodes.values().any(|n| !n.state.is_terminal())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn run_state_of(&self, key: &TaskKey) -> Option<TaskRunState> {
        self.nodes.get(key).map(|n| n.state.into())
    }

    pub fn is_terminal(&self, key: &TaskKey) -> bool {
        self.nodes.get(key).is_some_and(|n| n.state.is_terminal())
    }

    pub fn result_of(&self, key: &TaskKey) -> Option<Arc<TaskResult>> {
        self.results.get(key).cloned()
    }

    /// All terminal results recorded so far.
    pub fn results(&self) -> &GraphResults {
        &self.results
    }

    fn allocate_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Merge an expansion into the graph.
    ///
    /// For each task, by key:
    /// - unknown: inserted as `Pending`;
    /// - known and not terminal: merged, never scheduled twice;
    /// - known, terminal, and the new request is forced: re-queued as a fresh
    ///   instance;
    /// - known, terminal, not forced: the existing result is reused.
    pub fn add(&mut self, expansion: Expansion) -> SchedulerStep {
        let mut touched: Vec<TaskKey> = Vec::new();
        let mut requeued: Vec<TaskKey> = Vec::new();

        let Expansion { mut nodes, order, .. } = expansion;
        for key in order {
            let Some(expanded) = nodes.remove(&key) else {
                continue;
            };

            match self.nodes.get(&key).map(|n| n.state) {
                None => {
                    let seq = self.allocate_seq();
                    let node = TaskNode::new(
                        key.clone(),
                        expanded.task,
                        seq,
                        expanded.dependencies.clone(),
                    );
                    debug!(task = %key, seq, "adding task to graph");
                    self.nodes.insert(key.clone(), node);
                    touched.push(key.clone());
                }
                Some(NodeState::Running) => {
                    debug!(task = %key, "task already running; merging request");
                }
                Some(state) if !state.is_terminal() => {
                    if self.rewire(&key, &expanded.dependencies) {
                        touched.push(key.clone());
                    }
                    if let Some(node) = self.nodes.get_mut(&key) {
                        if expanded.task.force() && !node.task.force() {
                            node.task = expanded.task;
                        }
                    }
                    debug!(task = %key, "task already queued; merging request");
                }
                Some(_) if expanded.task.force() => {
                    self.rewire(&key, &expanded.dependencies);
                    let seq = self.allocate_seq();
                    if let Some(node) = self.nodes.get_mut(&key) {
                        node.task = expanded.task;
                        node.state = NodeState::Pending;
                        node.seq = seq;
                        node.instance += 1;
                        info!(task = %key, instance = node.instance, "re-queueing forced task");
                    }
                    requeued.push(key.clone());
                    touched.push(key.clone());
                }
                Some(_) => {
                    debug!(task = %key, "task already complete; reusing result");
                }
            }

            let dependencies = self
                .nodes
                .get(&key)
                .map(|n| n.dependencies.clone())
                .unwrap_or_default();
            for dep in &dependencies {
                if let Some(dep_node) = self.nodes.get_mut(dep) {
                    dep_node.dependants.insert(key.clone());
                }
            }
        }

        let mut step = SchedulerStep::default();
        let mut manager = StateManager::new(&mut self.nodes, &mut self.ready, &mut self.results);
        for key in &requeued {
            manager.demote_dependants(key);
        }
        manager.promote(touched, &mut step);
        step
    }

    /// Point a not-running node at `dependencies`, which may name newer
    /// versions than the ones it was queued with.
    ///
    /// Returns true when the edges changed. A `Ready` node goes back to
    /// `Pending` so readiness is checked against the new edges.
    fn rewire(&mut self, key: &TaskKey, dependencies: &[TaskKey]) -> bool {
        let Some(node) = self.nodes.get_mut(key) else {
            return false;
        };
        if node.dependencies == dependencies {
            return false;
        }
        let stale: Vec<TaskKey> = node
            .dependencies
            .iter()
            .filter(|d| !dependencies.contains(d))
            .cloned()
            .collect();
        node.dependencies = dependencies.to_vec();
        if node.state == NodeState::Ready {
            self.ready.remove(&(node.seq, key.clone()));
            node.state = NodeState::Pending;
        }
        debug!(task = %key, dropped = stale.len(), "dependencies changed; rewiring");

        for dep in stale {
            if let Some(dep_node) = self.nodes.get_mut(&dep) {
                dep_node.dependants.remove(key);
            }
        }
        true
    }

    /// Hand out ready tasks, oldest first, up to the concurrency bound.
    pub fn next_ready(&mut self) -> Vec<ScheduledTask> {
        let mut scheduled = Vec::new();

        while self.running < self.concurrency {
            let Some((seq, key)) = self.ready.pop_first() else {
                break;
            };
            let Some(node) = self.nodes.get_mut(&key) else {
                warn!(task = %key, "ready task missing from graph");
                continue;
            };
            node.state = NodeState::Running;
            self.running += 1;
            debug!(task = %key, seq, instance = node.instance, "dispatching task");

            scheduled.push(ScheduledTask {
                key: key.clone(),
                task: node.task.clone(),
                dependency_results: self.results.filter(&node.dependencies),
                instance: node.instance,
            });
        }

        scheduled
    }

    /// Record the settled `process()` of a running task.
    ///
    /// Completions for an instance that is no longer running are ignored.
    pub fn complete(
        &mut self,
        key: &TaskKey,
        instance: u32,
        outcome: Result<TaskOutput, TaskError>,
        duration: Duration,
    ) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        let Some(node) = self.nodes.get_mut(key) else {
            warn!(task = %key, "completion for unknown task; ignoring");
            return step;
        };
        if node.state != NodeState::Running || node.instance != instance {
            warn!(task = %key, instance, "completion for stale task instance; ignoring");
            return step;
        }
        self.running = self.running.saturating_sub(1);

        let action = node.task.action();
        let mut result = TaskResult {
            key: key.clone(),
            task_type: node.task.task_type(),
            name: node.task.name().to_string(),
            action: action.map(|a| a.reference()),
            version: action.map(|a| a.version.clone()),
            outcome: TaskOutcome::Success,
            outputs: Default::default(),
            resolved_spec: None,
            error: None,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            dependency_results: self.results.filter(&node.dependencies),
            instance,
        };

        let failed = match outcome {
            Ok(output) => {
                result.outcome = if output.skipped {
                    TaskOutcome::Skipped
                } else {
                    TaskOutcome::Success
                };
                result.outputs = output.outputs;
                result.resolved_spec = output.resolved_spec;
                false
            }
            Err(error) => {
                warn!(task = %key, error = %error, "task failed; failing dependants");
                result.outcome = TaskOutcome::Failed;
                result.error = Some(error);
                true
            }
        };

        node.state = NodeState::Done(result.outcome);
        let dependants: Vec<TaskKey> = node.dependants.iter().cloned().collect();
        self.results.insert(Arc::new(result));

        step.completed.push(key.clone());
        if failed {
            step.newly_failed.push(key.clone());
        }

        let mut manager = StateManager::new(&mut self.nodes, &mut self.ready, &mut self.results);
        if failed {
            let mut cascade = SchedulerStep::default();
            for dependant in dependants {
                manager.fail_with_dependency(&dependant, key.clone(), &mut cascade);
            }
            step.absorb(cascade);
        } else {
            manager.promote(dependants, &mut step);
        }

        step
    }
}
