// src/events.rs

//! Typed publish/subscribe bus.
//!
//! The bus is an explicit value owned by the process orchestrator and handed
//! to the task graph and the file watcher; nothing subscribes through global
//! state. Delivery is in emission order per subscriber.

use std::path::PathBuf;

use tokio::sync::broadcast;
use tracing::warn;

use crate::errors::TaskError;
use crate::task::TaskKey;

pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The task graph went from idle to busy.
    TaskGraphProcessing,
    /// The task graph drained every queued task.
    TaskGraphComplete,
    TaskComplete {
        key: TaskKey,
    },
    TaskError {
        key: TaskKey,
        error: TaskError,
    },
    WatchingForChanges,
    ModuleSourcesChanged {
        names: Vec<String>,
    },
    ModuleConfigChanged {
        names: Vec<String>,
        path: PathBuf,
    },
    ConfigAdded {
        path: PathBuf,
    },
    ConfigRemoved {
        path: PathBuf,
    },
    ProjectConfigChanged {
        path: PathBuf,
    },
    Restart,
    Exit,
    BuildRequested {
        module: String,
        force: bool,
    },
    DeployRequested {
        name: String,
        force: bool,
        force_build: bool,
        dev_mode: bool,
    },
    TestRequested {
        module: String,
        test_names: Vec<String>,
        force: bool,
        force_build: bool,
    },
    UpdateBuildOnWatch {
        modules: Vec<String>,
    },
    UpdateDeployOnWatch {
        names: Vec<String>,
    },
    UpdateTestOnWatch {
        modules: Vec<String>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::TaskGraphProcessing => "taskGraphProcessing",
            Event::TaskGraphComplete => "taskGraphComplete",
            Event::TaskComplete { .. } => "taskComplete",
            Event::TaskError { .. } => "taskError",
            Event::WatchingForChanges => "watchingForChanges",
            Event::ModuleSourcesChanged { .. } => "moduleSourcesChanged",
            Event::ModuleConfigChanged { .. } => "moduleConfigChanged",
            Event::ConfigAdded { .. } => "configAdded",
            Event::ConfigRemoved { .. } => "configRemoved",
            Event::ProjectConfigChanged { .. } => "projectConfigChanged",
            Event::Restart => "_restart",
            Event::Exit => "_exit",
            Event::BuildRequested { .. } => "buildRequested",
            Event::DeployRequested { .. } => "deployRequested",
            Event::TestRequested { .. } => "testRequested",
            Event::UpdateBuildOnWatch { .. } => "updateBuildStatusOnWatch",
            Event::UpdateDeployOnWatch { .. } => "updateDeployStatusOnWatch",
            Event::UpdateTestOnWatch { .. } => "updateTestStatusOnWatch",
        }
    }
}

/// In-process event bus based on a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to every current subscriber. No subscribers is not an error.
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Subscription handle. Dropping it unsubscribes.
#[derive(Debug)]
pub struct EventReceiver {
    rx: broadcast::Receiver<Event>,
}

impl EventReceiver {
    /// Next event, or `None` once every sender is gone.
    ///
    /// A lagging subscriber loses the overwritten events, logs a warning and
    /// carries on with the oldest retained one.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged; events dropped");
                }
                Err(_) => return None,
            }
        }
    }
}
