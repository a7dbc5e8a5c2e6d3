// src/process/mod.rs

//! Process orchestrator.
//!
//! - [`core`] is the pure session state machine.
//! - [`dev`] plans initial and change-triggered tasks.
//! - [`requests`] turns remote requests into tasks and settings updates.
//! - [`settings`] holds the in-scope filters.
//!
//! [`process_actions`] is the async shell: it owns the session's event
//! subscription, submits batches to the [`TaskGraph`] and performs trial
//! reloads through the [`ConfigSource`].

pub mod core;
pub mod dev;
pub mod requests;
pub mod settings;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigGraph, ConfigSource};
use crate::engine::TaskGraph;
use crate::errors::Result;
use crate::events::{Event, EventBus};
use crate::task::{GraphResults, Task};

pub use self::core::{WatchCommand, WatchCore, WatchInput, WatchState};
pub use dev::{DevPlanner, TaskPlanner, watched_modules};
pub use requests::{Request, SettingsUpdate};
pub use settings::TaskSettings;

/// Everything one orchestrator invocation needs.
pub struct ProcessParams {
    pub graph: Arc<dyn ConfigGraph>,
    pub config_source: Arc<dyn ConfigSource>,
    pub task_graph: TaskGraph,
    pub events: EventBus,
    pub planner: Arc<dyn TaskPlanner>,
    pub settings: TaskSettings,
    pub watch: bool,
}

/// What the orchestrator hands back to the command layer.
#[derive(Debug, Clone, Default)]
pub struct ProcessResults {
    /// Latest result per task key across the initial and every watch batch.
    pub task_results: GraphResults,
    pub restart_required: bool,
}

struct BatchDone {
    initial: bool,
    outcome: Result<GraphResults>,
}

/// Run the initial tasks and, in watch mode, keep re-planning on change
/// events until a restart or exit is requested.
///
/// Batches still in flight when the session ends are abandoned: their
/// tasks finish in the background, but their results are not awaited.
pub async fn process_actions(params: ProcessParams) -> Result<ProcessResults> {
    let ProcessParams {
        mut graph,
        config_source,
        task_graph,
        events,
        planner,
        mut settings,
        watch,
    } = params;

    let mut subscription = events.subscribe();
    let (batch_tx, mut batch_rx) = mpsc::channel::<BatchDone>(16);
    let mut core = WatchCore::new(watch);
    let mut results = ProcessResults::default();

    let initial = planner.initial_tasks(graph.as_ref(), &settings)?;
    if watch {
        core.set_watched(watched_modules(graph.as_ref(), &initial)?);
        debug!(modules = ?core.watched(), "watching modules");
    }
    let mut initial = Some(initial);

    let mut pending = core.step(WatchInput::Start);
    loop {
        while !pending.is_empty() {
            let commands = std::mem::take(&mut pending);
            for command in commands {
                match command {
                    WatchCommand::SubmitInitial => {
                        let tasks = initial.take().unwrap_or_default();
                        info!(tasks = tasks.len(), "processing initial tasks");
                        submit(&task_graph, &graph, tasks, true, &batch_tx);
                    }
                    WatchCommand::AnnounceWaiting => {
                        info!("waiting for code changes");
                        events.emit(Event::WatchingForChanges);
                    }
                    WatchCommand::PlanChanged { modules } => {
                        graph = reload_for_sources(config_source.as_ref(), graph).await?;
                        let tasks = plan_changed(planner.as_ref(), graph.as_ref(), &modules, &settings);
                        submit(&task_graph, &graph, tasks, false, &batch_tx);
                    }
                    WatchCommand::TrialReload { path } => {
                        info!(path = ?path, "configuration edited; validating");
                        let input = trial_reload(config_source.as_ref()).await?;
                        pending.extend(core.step(input));
                    }
                    WatchCommand::HandleRequest(request) => {
                        match request.tasks(graph.as_ref(), &mut settings) {
                            Ok(tasks) => submit(&task_graph, &graph, tasks, false, &batch_tx),
                            Err(err) => error!(error = %err, ?request, "cannot handle request"),
                        }
                    }
                    WatchCommand::UpdateSettings(update) => update.apply(&mut settings),
                    WatchCommand::Exit { restart_required } => {
                        results.restart_required = restart_required;
                        info!(restart_required, "leaving dev session");
                        return Ok(results);
                    }
                }
            }
        }

        let input = tokio::select! {
            Some(done) = batch_rx.recv() => {
                let batch = done.outcome?;
                results.task_results.extend(batch);
                if !done.initial {
                    continue;
                }
                WatchInput::InitialComplete
            }
            event = subscription.recv() => match event {
                Some(event) => WatchInput::Event(event),
                None => {
                    warn!("event bus closed; leaving dev session");
                    return Ok(results);
                }
            },
        };
        pending = core.step(input);
    }
}

fn submit(
    task_graph: &TaskGraph,
    graph: &Arc<dyn ConfigGraph>,
    tasks: Vec<Task>,
    initial: bool,
    done: &mpsc::Sender<BatchDone>,
) {
    if tasks.is_empty() && !initial {
        return;
    }
    let task_graph = task_graph.clone();
    let graph = Arc::clone(graph);
    let done = done.clone();
    tokio::spawn(async move {
        let outcome = task_graph.process(graph.as_ref(), tasks).await;
        if done.send(BatchDone { initial, outcome }).await.is_err() {
            debug!("dev session ended before batch settled");
        }
    });
}

/// Fresh graph for a source change so versions reflect the new contents.
/// A configuration error keeps the previous graph.
async fn reload_for_sources(
    source: &dyn ConfigSource,
    previous: Arc<dyn ConfigGraph>,
) -> Result<Arc<dyn ConfigGraph>> {
    match source.load().await {
        Ok(graph) => Ok(graph),
        Err(err) if err.is_configuration() => {
            warn!(error = %err, "failed to reload configuration; keeping previous graph");
            Ok(previous)
        }
        Err(err) => Err(err),
    }
}

fn plan_changed(
    planner: &dyn TaskPlanner,
    graph: &dyn ConfigGraph,
    modules: &[String],
    settings: &TaskSettings,
) -> Vec<Task> {
    let mut tasks = Vec::new();
    for name in modules {
        let planned = graph
            .module(name)
            .and_then(|module| planner.change_tasks(graph, &module, settings));
        match planned {
            Ok(t) => {
                info!(module = %name, tasks = t.len(), "sources changed; re-planning");
                tasks.extend(t);
            }
            Err(err) => warn!(module = %name, error = %err, "cannot plan changed module"),
        }
    }
    tasks
}

async fn trial_reload(source: &dyn ConfigSource) -> Result<WatchInput> {
    match source.load().await {
        Ok(_) => Ok(WatchInput::ReloadSucceeded),
        Err(err) if err.is_configuration() => {
            error!(error = %err, "invalid configuration; keeping the current one");
            Ok(WatchInput::ReloadRejected)
        }
        Err(err) => Err(err),
    }
}
