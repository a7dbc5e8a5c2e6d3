// src/watch/watcher.rs

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ConfigGraph;
use crate::events::EventBus;
use crate::watch::event_handler::{ChangeBatch, ChangeClassifier, ChangeKind};
use crate::watch::patterns::SourceProfile;

/// How long to keep collecting paths after the first change of a burst.
pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// Keeps the underlying `RecommendedWatcher` alive. Dropping this handle
/// stops file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Source profiles of every action in `graph`.
pub fn profiles_for(graph: &dyn ConfigGraph) -> Result<Vec<SourceProfile>> {
    graph
        .actions(None)
        .iter()
        .map(|a| SourceProfile::for_action(a))
        .collect()
}

/// Watch `root` recursively and publish config and module-source events for
/// the actions of `graph` on `events`.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    graph: &dyn ConfigGraph,
    events: EventBus,
) -> Result<WatcherHandle> {
    let root = root.into();
    let root = root.canonicalize().unwrap_or(root);

    let classifier = ChangeClassifier::new(
        root.clone(),
        graph.config_files().to_vec(),
        profiles_for(graph)?,
    );

    // Channel from the blocking notify callback into the async world.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<notify::Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                if event_tx.send(event).is_err() {
                    eprintln!("devgraph: failed to forward file event");
                }
            }
            Err(err) => eprintln!("devgraph: file watch error: {err}"),
        },
        Config::default(),
    )?;
    watcher.watch(&root, RecursiveMode::Recursive)?;

    info!(root = ?root, "file watcher started");
    tokio::spawn(forward_changes(classifier, event_rx, events));

    Ok(WatcherHandle { _inner: watcher })
}

async fn forward_changes(
    classifier: ChangeClassifier,
    mut rx: mpsc::UnboundedReceiver<notify::Event>,
    events: EventBus,
) {
    while let Some(first) = rx.recv().await {
        let mut batch = ChangeBatch::default();
        absorb(&classifier, first, &mut batch);

        let deadline = tokio::time::Instant::now() + DEBOUNCE;
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(next)) => absorb(&classifier, next, &mut batch),
                Ok(None) | Err(_) => break,
            }
        }

        if batch.is_empty() {
            continue;
        }
        for event in batch.into_events() {
            debug!(event = event.name(), "publishing file change");
            events.emit(event);
        }
    }
    warn!("file watcher stopped");
}

fn absorb(classifier: &ChangeClassifier, event: notify::Event, batch: &mut ChangeBatch) {
    if event.kind.is_access() {
        return;
    }
    let kind = ChangeKind::from(&event.kind);
    for path in &event.paths {
        classifier.classify(path, kind, batch);
    }
}
