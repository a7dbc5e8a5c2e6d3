// src/router/mod.rs

//! Action routers: the boundary between scheduling and actually doing work.
//!
//! The task graph never knows how an action is performed. It hands a
//! [`ResolvedAction`] (action plus its spec with every output reference
//! substituted) to an [`ActionRouter`].
//!
//! - [`exec`] provides [`ExecRouter`], which runs shell commands.
//! - [`status`] provides version stores used by routers to answer status
//!   checks.
//!
//! Tests plug in their own router (see `devgraph-test-utils`).

pub mod exec;
pub mod status;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::Action;
use crate::errors::TaskError;
use crate::types::ActionStatus;

pub use exec::ExecRouter;
pub use status::{FileVersionStore, MemoryVersionStore, StoredBuild, VersionStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An action with its spec fully resolved.
#[derive(Debug, Clone)]
pub struct ResolvedAction {
    pub action: Arc<Action>,
    pub spec: toml::Table,
    pub dev_mode: bool,
}

impl ResolvedAction {
    pub fn new(action: Arc<Action>, spec: toml::Table) -> Self {
        Self {
            action,
            spec,
            dev_mode: false,
        }
    }

    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    pub fn spec_str(&self, key: &str) -> Option<&str> {
        self.spec.get(key).and_then(|v| v.as_str())
    }
}

/// Result of a successful execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionResult {
    pub outputs: BTreeMap<String, String>,
}

/// Answer to a status check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusReport {
    pub status: ActionStatus,
    /// Outputs of the previous execution, used when the task is skipped.
    pub outputs: BTreeMap<String, String>,
}

impl StatusReport {
    pub fn ready(outputs: BTreeMap<String, String>) -> Self {
        Self {
            status: ActionStatus::Ready,
            outputs,
        }
    }
}

/// Performs actions for the task graph.
///
/// `execute` is called at most once per task execution; retries and backoff
/// are the router's business.
pub trait ActionRouter: Send + Sync {
    fn execute<'a>(
        &'a self,
        action: &'a ResolvedAction,
    ) -> BoxFuture<'a, Result<ActionResult, TaskError>>;

    /// Whether `action` is already up to date at its current version.
    fn get_status<'a>(
        &'a self,
        action: &'a ResolvedAction,
    ) -> BoxFuture<'a, Result<StatusReport, TaskError>> {
        let _ = action;
        Box::pin(async { Ok(StatusReport::default()) })
    }
}
