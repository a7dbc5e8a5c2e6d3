// src/engine/core.rs

//! Pure core state machine of the task graph.
//!
//! Consumes [`GraphEvent`]s and produces commands for the IO shell
//! (`engine::runtime::GraphRuntime`): dispatch tasks, answer submitters,
//! emit events. No Tokio types, channels or IO live here, so it can be
//! driven step by step in tests.

use crate::dag::Scheduler;
use crate::engine::event_handlers::{Batches, CoreStep, handle_settled, handle_submit};
use crate::engine::GraphEvent;
use crate::task::GraphResults;

#[derive(Debug)]
pub struct GraphCore {
    scheduler: Scheduler,
    batches: Batches,
}

impl GraphCore {
    pub fn new(concurrency: usize) -> Self {
        Self {
            scheduler: Scheduler::new(concurrency),
            batches: Batches::new(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    pub fn open_batches(&self) -> usize {
        self.batches.len()
    }

    pub fn results(&self) -> &GraphResults {
        self.scheduler.results()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Handle a single event, returning the commands for the IO shell.
    pub fn step(&mut self, event: GraphEvent) -> CoreStep {
        match event {
            GraphEvent::Submit { batch, expansion } => {
                handle_submit(&mut self.scheduler, &mut self.batches, batch, expansion)
            }
            GraphEvent::TaskSettled {
                key,
                instance,
                outcome,
                duration,
            } => {
                let step = self.scheduler.complete(&key, instance, outcome, duration);
                handle_settled(&mut self.scheduler, &mut self.batches, step)
            }
            GraphEvent::Shutdown => CoreStep {
                commands: Vec::new(),
                keep_running: false,
            },
        }
    }
}
