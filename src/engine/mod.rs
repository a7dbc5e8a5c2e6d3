// src/engine/mod.rs

//! Task graph engine.
//!
//! This module ties together:
//! - the pure scheduler (`dag`)
//! - submission batches (who is waiting for which task keys)
//! - the async runtime loop that reacts to:
//!   - submissions from [`TaskGraph`] handles
//!   - settled `process()` calls from workers
//!   - shutdown
//!
//! The pure core state machine lives in [`core`] (handlers in
//! [`event_handlers`]); the async/IO shell is implemented in [`runtime`];
//! [`task_graph`] is the cloneable handle callers use.

use std::time::Duration;

use crate::dag::Expansion;
use crate::errors::TaskError;
use crate::task::{TaskKey, TaskOutput};

pub mod core;
pub mod event_handlers;
pub mod runtime;
pub mod task_graph;

pub use self::core::GraphCore;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::GraphRuntime;
pub use task_graph::{TaskGraph, TaskGraphOptions};

/// Identifies one submission.
pub type BatchId = u64;

/// Events flowing into the core from handles and workers.
#[derive(Debug)]
pub enum GraphEvent {
    /// New tasks (already expanded) to merge into the graph.
    Submit {
        batch: BatchId,
        expansion: Expansion,
    },
    /// A worker's `process()` settled.
    TaskSettled {
        key: TaskKey,
        instance: u32,
        outcome: Result<TaskOutput, TaskError>,
        duration: Duration,
    },
    Shutdown,
}
