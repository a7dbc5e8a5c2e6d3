// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod events;
pub mod logging;
pub mod process;
pub mod router;
pub mod task;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigGraph, ConfigSource, DependencyQuery, FileConfigSource};
use crate::engine::{TaskGraph, TaskGraphOptions};
use crate::events::{Event, EventBus};
use crate::process::{DevPlanner, ProcessParams, TaskSettings, process_actions};
use crate::router::{ExecRouter, FileVersionStore, VersionStore};
use crate::task::GraphResults;
use crate::types::ActionKind;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - task graph + exec router
/// - the process orchestrator
/// - (optional) file watcher
/// - Ctrl-C handling
///
/// Loops while the orchestrator asks for a restart. Returns whether every
/// task of the last session succeeded.
pub async fn run(args: CliArgs) -> Result<bool> {
    let config_path = PathBuf::from(&args.config);
    let source = Arc::new(FileConfigSource::new(&config_path));
    let root = source.root().to_path_buf();

    if args.dry_run {
        let graph = source.load_graph()?;
        print_dry_run(&graph)?;
        return Ok(true);
    }

    let events = EventBus::default();

    // Ctrl-C → leave the watch loop. Without --watch the default handler
    // stays in place.
    if args.watch {
        let events = events.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            events.emit(Event::Exit);
        });
    }

    let mut settings = TaskSettings::default()
        .with_deploy_names(args.deploy.clone())
        .with_test_names(args.test_names.clone());
    if args.skip_tests {
        settings = settings.skip_tests();
    }
    let planner = Arc::new(DevPlanner {
        force: args.force,
        force_build: args.force_build,
    });

    loop {
        let graph = source.load().await?;
        let concurrency = args.concurrency.unwrap_or_else(|| graph.concurrency());
        info!(project = %graph.project_name(), concurrency, "starting");

        let mut versions = FileVersionStore::new(root.clone());
        let build_names: Vec<String> = graph
            .actions(Some(ActionKind::Build))
            .iter()
            .map(|a| a.describe())
            .collect();
        let active: Vec<&str> = build_names.iter().map(String::as_str).collect();
        if let Err(e) = versions.prune(&active) {
            warn!("failed to prune stale versions: {e}");
        }
        let router = ExecRouter::new(root.clone()).with_version_store(Box::new(versions));

        let task_graph = TaskGraph::spawn(
            Arc::new(router),
            events.clone(),
            TaskGraphOptions { concurrency },
        );

        let _watcher = if args.watch {
            Some(watch::spawn_watcher(&root, graph.as_ref(), events.clone())?)
        } else {
            None
        };

        let results = process_actions(ProcessParams {
            graph,
            config_source: source.clone() as Arc<dyn ConfigSource>,
            task_graph,
            events: events.clone(),
            planner: planner.clone(),
            settings: settings.clone(),
            watch: args.watch,
        })
        .await?;

        let ok = report(&results.task_results);
        if results.restart_required {
            info!("restarting with the new configuration");
            continue;
        }
        return Ok(ok);
    }
}

/// Print one line per task and every failure. Returns whether none failed.
fn report(results: &GraphResults) -> bool {
    for (key, result) in results.iter() {
        debug!(task = %key, outcome = ?result.outcome, duration_ms = result.duration_ms, "result");
    }

    let errors = results.errors();
    if errors.is_empty() {
        println!("{} task(s) done", results.len());
        return true;
    }

    println!("{} of {} task(s) failed:", errors.len(), results.len());
    for (key, err) in errors {
        println!("  {key}: {err}");
    }
    false
}

/// Dry-run output: every action with its version and dependencies.
fn print_dry_run(graph: &dyn ConfigGraph) -> Result<()> {
    println!("devgraph dry-run: {}", graph.project_name());
    println!("  concurrency = {}", graph.concurrency());
    println!();

    let actions = graph.actions(None);
    println!("actions ({}):", actions.len());
    for action in &actions {
        println!("  - {} ({}, {})", action.describe(), action.action_type, action.version);
        if action.module != action.name {
            println!("      module: {}", action.module);
        }
        let deps = graph.dependencies(&action.reference(), DependencyQuery::direct())?;
        if !deps.is_empty() {
            let names: Vec<String> = deps.iter().map(|d| d.describe()).collect();
            println!("      depends on: {}", names.join(", "));
        }
        if let Some(timeout) = action.timeout {
            println!("      timeout: {timeout:?}");
        }
        if action.disabled {
            println!("      disabled: true");
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
