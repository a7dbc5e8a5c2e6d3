// src/process/requests.rs

//! Remote requests received while watching: explicit build/deploy/test
//! requests and changes to the on-watch settings.

use tracing::info;

use crate::config::ConfigGraph;
use crate::errors::Result;
use crate::events::Event;
use crate::process::dev::test_tasks;
use crate::process::settings::{TaskSettings, add_to_list, remove_from_list};
use crate::task::Task;
use crate::types::{ActionKind, ActionRef};

/// A request to run something now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Build {
        module: String,
        force: bool,
    },
    Deploy {
        name: String,
        force: bool,
        force_build: bool,
        dev_mode: bool,
    },
    Test {
        module: String,
        test_names: Vec<String>,
        force: bool,
        force_build: bool,
    },
}

impl Request {
    pub fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::BuildRequested { module, force } => Some(Request::Build {
                module: module.clone(),
                force: *force,
            }),
            Event::DeployRequested {
                name,
                force,
                force_build,
                dev_mode,
            } => Some(Request::Deploy {
                name: name.clone(),
                force: *force,
                force_build: *force_build,
                dev_mode: *dev_mode,
            }),
            Event::TestRequested {
                module,
                test_names,
                force,
                force_build,
            } => Some(Request::Test {
                module: module.clone(),
                test_names: test_names.clone(),
                force: *force,
                force_build: *force_build,
            }),
            _ => None,
        }
    }

    /// Tasks fulfilling the request. A deploy request also records its dev
    /// mode choice in `settings`.
    pub fn tasks(&self, graph: &dyn ConfigGraph, settings: &mut TaskSettings) -> Result<Vec<Task>> {
        match self {
            Request::Build { module, force } => {
                info!(module = %module, "build requested");
                let module = graph.module(module)?;
                module
                    .actions_of(ActionKind::Build)
                    .map(|r| Ok(Task::execute(graph.action(r)?, *force)))
                    .collect()
            }
            Request::Deploy {
                name,
                force,
                force_build,
                dev_mode,
            } => {
                info!(deploy = %name, "deploy requested");
                let action = graph.action(&ActionRef::deploy(name.as_str()))?;
                let all: Vec<String> = graph
                    .actions(Some(ActionKind::Deploy))
                    .iter()
                    .map(|a| a.name.clone())
                    .collect();
                settings.dev_mode_names = if *dev_mode {
                    add_to_list(name, &settings.dev_mode_names)
                } else {
                    remove_from_list(name, &settings.dev_mode_names, &all)
                };
                Ok(vec![
                    Task::execute(action, *force)
                        .with_force_build(*force_build)
                        .with_dev_mode(*dev_mode),
                ])
            }
            Request::Test {
                module,
                test_names,
                force,
                force_build,
            } => {
                info!(module = %module, "tests requested");
                let module = graph.module(module)?;
                let narrowed = TaskSettings {
                    test_names: test_names.clone(),
                    ..settings.clone()
                };
                Ok(test_tasks(graph, &module, &narrowed, *force)?
                    .into_iter()
                    .map(|t| t.with_force_build(*force_build))
                    .collect())
            }
        }
    }
}

/// Replacement of one on-watch settings list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsUpdate {
    BuildModules(Vec<String>),
    DeployNames(Vec<String>),
    TestModules(Vec<String>),
}

impl SettingsUpdate {
    pub fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::UpdateBuildOnWatch { modules } => Some(Self::BuildModules(modules.clone())),
            Event::UpdateDeployOnWatch { names } => Some(Self::DeployNames(names.clone())),
            Event::UpdateTestOnWatch { modules } => Some(Self::TestModules(modules.clone())),
            _ => None,
        }
    }

    pub fn apply(self, settings: &mut TaskSettings) {
        match self {
            SettingsUpdate::BuildModules(modules) => {
                if modules.is_empty() {
                    info!("now skipping rebuilds on watch unless required by deploys or tests");
                } else {
                    info!(modules = ?modules, "now rebuilding on source changes");
                }
                settings.build_modules = modules;
            }
            SettingsUpdate::DeployNames(names) => {
                if names.is_empty() {
                    info!("now skipping redeploys on watch unless required by tests");
                } else {
                    info!(names = ?names, "now redeploying on source changes");
                }
                settings.deploy_names = names;
            }
            SettingsUpdate::TestModules(modules) => {
                if modules.is_empty() {
                    info!("now skipping tests on watch");
                } else {
                    info!(modules = ?modules, "now running tests on source changes");
                }
                settings.test_modules = modules;
            }
        }
    }
}
