// src/engine/task_graph.rs

//! Cloneable async handle to a running task graph.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::config::ConfigGraph;
use crate::dag::{Expansion, expand};
use crate::errors::{DevgraphError, Result, TaskError};
use crate::events::EventBus;
use crate::router::ActionRouter;
use crate::task::{GraphResults, Task, TaskOutcome, TaskResult};

use super::core::GraphCore;
use super::runtime::{GraphRequest, GraphRuntime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskGraphOptions {
    /// Upper bound on simultaneously running tasks.
    pub concurrency: usize,
}

impl Default for TaskGraphOptions {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

/// Handle used to submit tasks and await their results.
///
/// Every clone talks to the same graph, so concurrent submissions of the same
/// task key share one execution. The graph stops once the last handle is
/// dropped.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    tx: mpsc::Sender<GraphRequest>,
}

impl TaskGraph {
    /// Start a graph on the current Tokio runtime.
    pub fn spawn(router: Arc<dyn ActionRouter>, events: EventBus, options: TaskGraphOptions) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let runtime = GraphRuntime::new(GraphCore::new(options.concurrency), rx, router, events);
        tokio::spawn(runtime.run());
        Self { tx }
    }

    /// Expand `tasks` against `graph`, run them and their dependencies, and
    /// return the results of everything in the expansion.
    ///
    /// A requested task whose expansion hits a configuration error (a cycle,
    /// an unknown action) is returned as a failed result and is never
    /// scheduled; the remaining tasks still run.
    pub async fn process(&self, graph: &dyn ConfigGraph, tasks: Vec<Task>) -> Result<GraphResults> {
        let mut expansion = Expansion::default();
        let mut rejected = GraphResults::new();

        for task in tasks {
            match expand(std::slice::from_ref(&task), graph) {
                Ok(expanded) => expansion.merge(expanded),
                Err(err) if err.is_configuration() => {
                    error!(task = %task.describe(), error = %err, "cannot schedule task");
                    rejected.insert(Arc::new(rejected_result(&task, &err)));
                }
                Err(err) => return Err(err),
            }
        }

        if expansion.is_empty() {
            return Ok(rejected);
        }

        debug!(tasks = expansion.len(), "submitting to task graph");
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(GraphRequest { expansion, reply })
            .await
            .map_err(|_| DevgraphError::GraphClosed)?;

        let mut results = rx.await.map_err(|_| DevgraphError::GraphClosed)?;
        results.extend(rejected);
        Ok(results)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

fn rejected_result(task: &Task, err: &DevgraphError) -> TaskResult {
    let action = task.action();
    TaskResult {
        key: task.key(),
        task_type: task.task_type(),
        name: task.name().to_string(),
        action: action.map(|a| a.reference()),
        version: action.map(|a| a.version.clone()),
        outcome: TaskOutcome::Failed,
        outputs: Default::default(),
        resolved_spec: None,
        error: Some(TaskError::Configuration(err.to_string())),
        duration_ms: 0,
        dependency_results: GraphResults::new(),
        instance: 0,
    }
}
