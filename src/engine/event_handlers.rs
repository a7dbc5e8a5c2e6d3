// src/engine/event_handlers.rs

//! Event handling logic for the graph core.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::dag::{Expansion, ScheduledTask, Scheduler, SchedulerStep};
use crate::engine::BatchId;
use crate::events::Event;
use crate::task::{GraphResults, TaskKey};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Hand these tasks to workers.
    Dispatch(Vec<ScheduledTask>),
    /// Every key of a submission is terminal; answer its submitter.
    BatchComplete {
        batch: BatchId,
        results: GraphResults,
    },
    Emit(Event),
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone, Default)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Open submissions and the keys each is waiting on.
pub type Batches = BTreeMap<BatchId, BTreeSet<TaskKey>>;

/// Handle a submission: merge it, announce the graph going busy, settle any
/// batch already satisfied, and dispatch what became ready.
pub fn handle_submit(
    scheduler: &mut Scheduler,
    batches: &mut Batches,
    batch: BatchId,
    expansion: Expansion,
) -> CoreStep {
    let mut commands = Vec::new();
    let was_idle = scheduler.is_idle();

    let keys: BTreeSet<TaskKey> = expansion.nodes.keys().cloned().collect();
    debug!(batch, tasks = keys.len(), "submission received");
    batches.insert(batch, keys);

    let step = scheduler.add(expansion);

    if was_idle && !scheduler.is_idle() {
        info!("task graph processing");
        commands.push(CoreCommand::Emit(Event::TaskGraphProcessing));
    }

    finish_step(scheduler, batches, step, was_idle, &mut commands);

    CoreStep {
        commands,
        keep_running: true,
    }
}

/// Handle a settled task: record it, propagate, dispatch and settle batches.
pub fn handle_settled(
    scheduler: &mut Scheduler,
    batches: &mut Batches,
    step: SchedulerStep,
) -> CoreStep {
    let mut commands = Vec::new();
    finish_step(scheduler, batches, step, false, &mut commands);
    CoreStep {
        commands,
        keep_running: true,
    }
}

fn finish_step(
    scheduler: &mut Scheduler,
    batches: &mut Batches,
    step: SchedulerStep,
    was_idle: bool,
    commands: &mut Vec<CoreCommand>,
) {
    for key in &step.completed {
        let event = match scheduler.result_of(key).and_then(|r| r.error.clone()) {
            Some(error) => Event::TaskError {
                key: key.clone(),
                error,
            },
            None => Event::TaskComplete { key: key.clone() },
        };
        commands.push(CoreCommand::Emit(event));
    }

    let ready = scheduler.next_ready();
    if !ready.is_empty() {
        commands.push(CoreCommand::Dispatch(ready));
    }

    let done: Vec<BatchId> = batches
        .iter()
        .filter(|(_, keys)| keys.iter().all(|k| scheduler.is_terminal(k)))
        .map(|(id, _)| *id)
        .collect();
    for batch in done {
        if let Some(keys) = batches.remove(&batch) {
            debug!(batch, "submission complete");
            commands.push(CoreCommand::BatchComplete {
                batch,
                results: scheduler.results().filter(&keys),
            });
        }
    }

    if !was_idle && !step.completed.is_empty() && scheduler.is_idle() {
        info!("task graph complete");
        commands.push(CoreCommand::Emit(Event::TaskGraphComplete));
    }
}
