// src/dag/mod.rs

//! Dependency expansion and scheduling.
//!
//! - [`resolver`] expands requested tasks into their dependency closure.
//! - [`scheduler`] is the pure state machine that decides which tasks are
//!   ready, hands them out under the concurrency bound and records results.
//! - [`node`] holds per-task state and the scheduled task type.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] handles readiness and failure propagation.

pub mod node;
pub mod resolver;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;

pub use node::{ScheduledTask, TaskRunState};
pub use resolver::{ExpandedTask, Expansion, expand};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
