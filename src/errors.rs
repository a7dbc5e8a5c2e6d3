// src/errors.rs

//! Crate-wide error types.
//!
//! Two families:
//! - [`DevgraphError`] is fatal to whatever asked for the work (loading a
//!   project, expanding a task, talking to a closed graph).
//! - [`TaskError`] is attached to a task's terminal result. It is `Clone` so
//!   the same failure can be handed to every submitter of that task key.

use std::time::Duration;

use thiserror::Error;

use crate::task::TaskKey;

#[derive(Error, Debug)]
pub enum DevgraphError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Action '{0}' cannot depend on itself")]
    SelfReference(String),

    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("task graph is no longer running")]
    GraphClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DevgraphError {
    /// Whether this error was caused by the project configuration itself.
    ///
    /// Configuration errors are surfaced to the caller but never crash a
    /// running watch session; everything else is propagated.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DevgraphError::ConfigError(_)
                | DevgraphError::UnknownAction(_)
                | DevgraphError::SelfReference(_)
                | DevgraphError::DependencyCycle { .. }
                | DevgraphError::TomlError(_)
        )
    }
}

/// Failure recorded on a task's terminal result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("execution failed: {0}")]
    Execution(String),

    #[error("timed out after {limit:?}")]
    Timeout { limit: Duration },

    #[error("aborted")]
    Aborted,

    #[error("dependency {dependency} failed")]
    DependencyFailed { dependency: TaskKey },

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DevgraphError>;
