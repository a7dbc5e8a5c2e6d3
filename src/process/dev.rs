// src/process/dev.rs

//! Task planning for a dev session: what to run at startup and what to
//! re-run when a module's sources change.

use std::collections::BTreeSet;

use tracing::debug;

use crate::config::{ConfigGraph, DependencyQuery, Module};
use crate::errors::{DevgraphError, Result};
use crate::process::settings::TaskSettings;
use crate::task::Task;
use crate::types::ActionKind;

/// Plans the tasks the orchestrator submits.
///
/// `change_tasks` is the change handler invoked for every watched module
/// whose sources changed, against the freshly reloaded graph.
pub trait TaskPlanner: Send + Sync {
    fn initial_tasks(&self, graph: &dyn ConfigGraph, settings: &TaskSettings) -> Result<Vec<Task>>;

    fn change_tasks(
        &self,
        graph: &dyn ConfigGraph,
        module: &Module,
        settings: &TaskSettings,
    ) -> Result<Vec<Task>>;
}

/// Default planner of `devgraph --watch`.
///
/// Startup: every module's builds, the tests of tested modules and the
/// selected deploys, forced only as the flags say. On change: forced builds, deploys and
/// tests of the module and of every module depending on it, each subject to
/// the settings.
///
/// There is no hot reload. A deploy listed in the dev-mode settings is
/// redeployed like any other on change; it only carries the `dev_mode`
/// flag through to its router.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevPlanner {
    /// Skip status checks for the initial tasks.
    pub force: bool,
    /// Force the builds the initial tasks depend on.
    pub force_build: bool,
}

impl TaskPlanner for DevPlanner {
    fn initial_tasks(&self, graph: &dyn ConfigGraph, settings: &TaskSettings) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();

        for module in graph.modules() {
            for reference in module.actions_of(ActionKind::Build) {
                let force = self.force || self.force_build;
                tasks.push(Task::execute(graph.action(reference)?, force));
            }
            if settings.tests_module(&module.name) {
                for task in test_tasks(graph, &module, settings, self.force)? {
                    tasks.push(task.with_force_build(self.force_build));
                }
            }
        }

        for action in graph.actions(Some(ActionKind::Deploy)) {
            if action.disabled || !settings.deploys(&action.name) {
                continue;
            }
            let dev_mode = settings.dev_mode(&action.name);
            tasks.push(
                Task::execute(action, self.force)
                    .with_force_build(self.force_build)
                    .with_dev_mode(dev_mode),
            );
        }

        debug!(tasks = tasks.len(), "planned initial tasks");
        Ok(tasks)
    }

    fn change_tasks(
        &self,
        graph: &dyn ConfigGraph,
        module: &Module,
        settings: &TaskSettings,
    ) -> Result<Vec<Task>> {
        let mut tasks = Vec::new();
        let mut affected = vec![module.clone()];
        for name in dependant_modules(graph, module)? {
            affected.push(graph.module(&name)?);
        }

        for m in &affected {
            if settings.builds_module(&m.name) {
                for reference in m.actions_of(ActionKind::Build) {
                    tasks.push(Task::execute(graph.action(reference)?, true));
                }
            }
            for reference in m.actions_of(ActionKind::Deploy) {
                let action = graph.action(reference)?;
                if action.disabled || !settings.deploys(&action.name) {
                    continue;
                }
                let dev_mode = settings.dev_mode(&action.name);
                tasks.push(Task::execute(action, true).with_dev_mode(dev_mode));
            }
            if settings.tests_module(&m.name) {
                tasks.extend(test_tasks(graph, m, settings, true)?);
            }
        }

        debug!(module = %module.name, tasks = tasks.len(), "planned watch tasks");
        Ok(tasks)
    }
}

/// Test tasks of `module`, filtered by the settings' test-name globs.
pub fn test_tasks(
    graph: &dyn ConfigGraph,
    module: &Module,
    settings: &TaskSettings,
    force: bool,
) -> Result<Vec<Task>> {
    let filter = settings.test_filter().map_err(DevgraphError::Other)?;
    let mut tasks = Vec::new();
    for reference in module.actions_of(ActionKind::Test) {
        if filter.as_ref().is_some_and(|f| !f.matches(&reference.name)) {
            continue;
        }
        let action = graph.action(reference)?;
        if action.disabled {
            continue;
        }
        tasks.push(Task::execute(action, force));
    }
    Ok(tasks)
}

/// Modules (other than `module`) with an action that depends, directly or
/// not, on one of `module`'s actions.
pub fn dependant_modules(graph: &dyn ConfigGraph, module: &Module) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for reference in &module.actions {
        for action in graph.dependants(reference, DependencyQuery::recursive())? {
            if action.module != module.name {
                names.insert(action.module.clone());
            }
        }
    }
    Ok(names)
}

/// Modules a watch session reacts to: those of the planned tasks plus the
/// modules of everything they build on.
pub fn watched_modules(graph: &dyn ConfigGraph, tasks: &[Task]) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for task in tasks {
        let Some(action) = task.action() else {
            continue;
        };
        names.insert(action.module.clone());
        let query = DependencyQuery::recursive().of_kind(ActionKind::Build);
        for dep in graph.dependencies(&action.reference(), query)? {
            names.insert(dep.module.clone());
        }
    }
    Ok(names)
}
