// src/engine/runtime.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::dag::{Expansion, ScheduledTask};
use crate::errors::TaskError;
use crate::events::EventBus;
use crate::router::ActionRouter;
use crate::task::GraphResults;

use super::core::GraphCore;
use super::{BatchId, CoreCommand, GraphEvent};

/// A submission from a [`super::TaskGraph`] handle.
#[derive(Debug)]
pub struct GraphRequest {
    pub expansion: Expansion,
    pub reply: oneshot::Sender<GraphResults>,
}

/// Drives [`GraphCore`] in response to submissions and settled workers, and
/// runs each dispatched task's `process()` on its own Tokio task.
///
/// This is the IO shell around the core: it owns the channels, the router
/// and the event bus, and nothing else.
pub struct GraphRuntime {
    core: GraphCore,
    requests: mpsc::Receiver<GraphRequest>,
    settled_tx: mpsc::Sender<GraphEvent>,
    settled_rx: mpsc::Receiver<GraphEvent>,
    router: Arc<dyn ActionRouter>,
    events: EventBus,
    waiting: HashMap<BatchId, oneshot::Sender<GraphResults>>,
    next_batch: BatchId,
}

impl fmt::Debug for GraphRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphRuntime")
            .field("core", &self.core)
            .field("waiting", &self.waiting.len())
            .finish_non_exhaustive()
    }
}

impl GraphRuntime {
    pub fn new(
        core: GraphCore,
        requests: mpsc::Receiver<GraphRequest>,
        router: Arc<dyn ActionRouter>,
        events: EventBus,
    ) -> Self {
        let (settled_tx, settled_rx) = mpsc::channel(256);
        Self {
            core,
            requests,
            settled_tx,
            settled_rx,
            router,
            events,
            waiting: HashMap::new(),
            next_batch: 0,
        }
    }

    /// Main event loop.
    ///
    /// Exits once every handle is dropped. Tasks still running at that point
    /// are abandoned: they settle on their own, but nobody records them.
    pub async fn run(mut self) {
        info!(concurrency = self.core.scheduler().concurrency(), "task graph started");

        loop {
            let event = tokio::select! {
                request = self.requests.recv() => match request {
                    Some(GraphRequest { expansion, reply }) => {
                        let batch = self.next_batch;
                        self.next_batch += 1;
                        self.waiting.insert(batch, reply);
                        GraphEvent::Submit { batch, expansion }
                    }
                    None => GraphEvent::Shutdown,
                },
                Some(settled) = self.settled_rx.recv() => settled,
            };

            let step = self.core.step(event);
            for command in step.commands {
                self.execute_command(command);
            }

            if !step.keep_running {
                if !self.core.is_idle() {
                    warn!("task graph handles dropped with tasks in flight; abandoning them");
                }
                break;
            }
        }

        info!("task graph stopped");
    }

    fn execute_command(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::Dispatch(tasks) => {
                for task in tasks {
                    self.spawn_task(task);
                }
            }
            CoreCommand::BatchComplete { batch, results } => {
                if let Some(reply) = self.waiting.remove(&batch) {
                    if reply.send(results).is_err() {
                        debug!(batch, "submitter went away before completion");
                    }
                }
            }
            CoreCommand::Emit(event) => self.events.emit(event),
        }
    }

    fn spawn_task(&self, scheduled: ScheduledTask) {
        let ScheduledTask {
            key,
            task,
            dependency_results,
            instance,
        } = scheduled;

        let span = info_span!("task", key = %key, r#type = %task.task_type());
        let router = Arc::clone(&self.router);
        let settled_tx = self.settled_tx.clone();

        tokio::spawn(
            async move {
                info!(task = %task.describe(), "processing");
                let started = Instant::now();

                let work = task.process(router.as_ref(), &dependency_results);
                let outcome = match task.timeout() {
                    Some(limit) => match tokio::time::timeout(limit, work).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(TaskError::Timeout { limit }),
                    },
                    None => work.await,
                };

                let duration = started.elapsed();
                match &outcome {
                    Ok(output) if output.skipped => info!(?duration, "skipped; already up to date"),
                    Ok(_) => info!(?duration, "done"),
                    Err(error) => warn!(?duration, error = %error, "failed"),
                }

                let event = GraphEvent::TaskSettled {
                    key,
                    instance,
                    outcome,
                    duration,
                };
                if settled_tx.send(event).await.is_err() {
                    debug!("task graph stopped before task settled");
                }
            }
            .instrument(span),
        );
    }
}
