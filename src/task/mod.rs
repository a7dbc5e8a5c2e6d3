// src/task/mod.rs

//! Tasks: the unit of schedulable work.
//!
//! - [`key`] defines [`TaskKey`], the identity used for de-duplication.
//! - [`result`] holds terminal results and [`GraphResults`].
//!
//! A [`Task`] is a tagged union over the task kinds. Every dispatch point
//! (`key`, `resolve_dependencies`, `process`) matches exhaustively.

pub mod key;
pub mod result;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::template::{referenced_actions, resolve_spec};
use crate::config::{Action, ConfigGraph};
use crate::errors::{DevgraphError, Result, TaskError};
use crate::router::{ActionRouter, ResolvedAction};
use crate::types::{ActionKind, ActionStatus};

pub use key::TaskKey;
pub use result::{GraphResults, TaskOutcome, TaskOutput, TaskResult};

/// Discriminant of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskType {
    Build,
    Deploy,
    Run,
    Test,
    ResolveAction,
    Process,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Build => "build",
            TaskType::Deploy => "deploy",
            TaskType::Run => "run",
            TaskType::Test => "test",
            TaskType::ResolveAction => "resolve-action",
            TaskType::Process => "process",
        }
    }

    /// Whether this type executes an action through the router.
    pub fn is_execution(&self) -> bool {
        matches!(
            self,
            TaskType::Build | TaskType::Deploy | TaskType::Run | TaskType::Test
        )
    }
}

impl From<ActionKind> for TaskType {
    fn from(kind: ActionKind) -> Self {
        match kind {
            ActionKind::Build => TaskType::Build,
            ActionKind::Deploy => TaskType::Deploy,
            ActionKind::Run => TaskType::Run,
            ActionKind::Test => TaskType::Test,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters shared by every action-backed task.
#[derive(Debug, Clone)]
pub struct ActionTask {
    pub action: Arc<Action>,
    /// Skip the status check and always execute.
    pub force: bool,
    /// Force the Build dependencies of this task.
    pub force_build: bool,
    /// Deploy in dev mode. Routers see it on `ResolvedAction::dev_mode`.
    pub dev_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMode {
    Dev,
    Watch,
}

impl ProcessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessMode::Dev => "dev",
            ProcessMode::Watch => "watch",
        }
    }
}

/// Compound task that completes once all of its children have.
#[derive(Debug, Clone)]
pub struct ProcessTask {
    pub mode: ProcessMode,
    pub label: String,
    pub children: Vec<Task>,
}

#[derive(Debug, Clone)]
pub enum Task {
    Build(ActionTask),
    Deploy(ActionTask),
    Run(ActionTask),
    Test(ActionTask),
    /// Resolve an action's spec without executing it.
    ResolveAction(ActionTask),
    Process(ProcessTask),
}

impl Task {
    /// Execution task matching the action's kind.
    pub fn execute(action: Arc<Action>, force: bool) -> Self {
        let params = ActionTask {
            action,
            force,
            force_build: false,
            dev_mode: false,
        };
        match params.action.kind {
            ActionKind::Build => Task::Build(params),
            ActionKind::Deploy => Task::Deploy(params),
            ActionKind::Run => Task::Run(params),
            ActionKind::Test => Task::Test(params),
        }
    }

    pub fn resolve(action: Arc<Action>) -> Self {
        Task::ResolveAction(ActionTask {
            action,
            force: false,
            force_build: false,
            dev_mode: false,
        })
    }

    pub fn compound(mode: ProcessMode, label: impl Into<String>, children: Vec<Task>) -> Self {
        Task::Process(ProcessTask {
            mode,
            label: label.into(),
            children,
        })
    }

    pub fn with_force_build(mut self, force_build: bool) -> Self {
        if let Some(params) = self.action_task_mut() {
            params.force_build = force_build;
        }
        self
    }

    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        if let Task::Deploy(params) = &mut self {
            params.dev_mode = dev_mode;
        }
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        if let Some(params) = self.action_task_mut() {
            params.force = force;
        }
        self
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            Task::Build(_) => TaskType::Build,
            Task::Deploy(_) => TaskType::Deploy,
            Task::Run(_) => TaskType::Run,
            Task::Test(_) => TaskType::Test,
            Task::ResolveAction(_) => TaskType::ResolveAction,
            Task::Process(_) => TaskType::Process,
        }
    }

    pub fn action_task(&self) -> Option<&ActionTask> {
        match self {
            Task::Build(p) | Task::Deploy(p) | Task::Run(p) | Task::Test(p) => Some(p),
            Task::ResolveAction(p) => Some(p),
            Task::Process(_) => None,
        }
    }

    fn action_task_mut(&mut self) -> Option<&mut ActionTask> {
        match self {
            Task::Build(p) | Task::Deploy(p) | Task::Run(p) | Task::Test(p) => Some(p),
            Task::ResolveAction(p) => Some(p),
            Task::Process(_) => None,
        }
    }

    pub fn action(&self) -> Option<&Arc<Action>> {
        self.action_task().map(|p| &p.action)
    }

    /// Stable identity; see [`TaskKey`].
    pub fn key(&self) -> TaskKey {
        match self {
            Task::Build(p) | Task::Deploy(p) | Task::Run(p) | Task::Test(p) => {
                TaskKey::new(format!("{}.{}.{}", p.action.kind, p.action.name, p.action.version))
            }
            Task::ResolveAction(p) => TaskKey::new(format!(
                "{}.{}.{}.{}",
                TaskType::ResolveAction,
                p.action.kind,
                p.action.name,
                p.action.version
            )),
            Task::Process(p) => TaskKey::new(format!(
                "{}.{}.{}.{}",
                TaskType::Process,
                p.mode.as_str(),
                p.label,
                children_digest(&p.children)
            )),
        }
    }

    /// Action name, or the label of a process task.
    pub fn name(&self) -> &str {
        match self {
            Task::Process(p) => &p.label,
            other => other.action().map(|a| a.name.as_str()).unwrap_or_default(),
        }
    }

    pub fn force(&self) -> bool {
        self.action_task().is_some_and(|p| p.force)
    }

    pub fn force_build(&self) -> bool {
        self.action_task().is_some_and(|p| p.force_build)
    }

    pub fn timeout(&self) -> Option<Duration> {
        match self {
            Task::ResolveAction(_) | Task::Process(_) => None,
            other => other.action().and_then(|a| a.timeout),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Task::Process(p) => format!("{} {}", p.mode.as_str(), p.label),
            other => match other.action() {
                Some(a) => format!("{} {}", self.task_type(), a.describe()),
                None => self.task_type().to_string(),
            },
        }
    }

    /// Direct dependencies of this task.
    ///
    /// Reads static edges (and output references already folded into
    /// `Action::dependencies`) from `graph`; performs no side effects.
    pub fn resolve_dependencies(&self, graph: &dyn ConfigGraph) -> Result<Vec<Task>> {
        match self {
            Task::Build(p) | Task::Deploy(p) | Task::Run(p) | Task::Test(p) => {
                let own = p.action.reference();
                p.action
                    .dependencies
                    .iter()
                    .map(|dep| {
                        if *dep == own {
                            return Err(DevgraphError::SelfReference(own.to_string()));
                        }
                        let action = graph.action(dep)?;
                        let force = p.force_build && dep.kind == ActionKind::Build;
                        Ok(Task::execute(action, force))
                    })
                    .collect()
            }
            Task::ResolveAction(p) => {
                let own = p.action.reference();
                referenced_actions(&p.action.spec)
                    .into_iter()
                    .map(|dep| {
                        if dep == own {
                            return Err(DevgraphError::SelfReference(own.to_string()));
                        }
                        Ok(Task::execute(graph.action(&dep)?, false))
                    })
                    .collect()
            }
            Task::Process(p) => Ok(p.children.clone()),
        }
    }

    /// Perform the work, given the results of the direct dependencies.
    pub async fn process(
        &self,
        router: &dyn ActionRouter,
        dependency_results: &GraphResults,
    ) -> std::result::Result<TaskOutput, TaskError> {
        match self {
            Task::Build(p) | Task::Deploy(p) | Task::Run(p) | Task::Test(p) => {
                execute_action(p, router, dependency_results).await
            }
            Task::ResolveAction(p) => {
                let spec = resolve_action_spec(&p.action, dependency_results)?;
                Ok(TaskOutput {
                    resolved_spec: Some(spec),
                    ..TaskOutput::default()
                })
            }
            Task::Process(p) => {
                debug!(
                    label = %p.label,
                    children = p.children.len(),
                    "process task complete"
                );
                Ok(TaskOutput::default())
            }
        }
    }
}

/// `c-` plus 10 hex chars over the sorted child keys.
fn children_digest(children: &[Task]) -> String {
    let mut keys: Vec<TaskKey> = children.iter().map(Task::key).collect();
    keys.sort();
    let mut hasher = blake3::Hasher::new();
    for key in &keys {
        hasher.update(key.as_str().as_bytes());
        hasher.update(b"\n");
    }
    let hex = hasher.finalize().to_hex();
    format!("c-{}", &hex.as_str()[..10])
}

async fn execute_action(
    params: &ActionTask,
    router: &dyn ActionRouter,
    dependency_results: &GraphResults,
) -> std::result::Result<TaskOutput, TaskError> {
    let action = &params.action;
    if action.disabled {
        debug!(action = %action.describe(), "action disabled; skipping");
        return Ok(TaskOutput::skipped(BTreeMap::new()));
    }

    let spec = resolve_action_spec(action, dependency_results)?;
    let resolved = ResolvedAction::new(action.clone(), spec).with_dev_mode(params.dev_mode);

    if !params.force {
        let report = router.get_status(&resolved).await?;
        if report.status == ActionStatus::Ready {
            debug!(
                action = %action.describe(),
                version = %action.version,
                "already up to date; skipping"
            );
            return Ok(TaskOutput::skipped(report.outputs));
        }
    }

    let result = router.execute(&resolved).await?;
    Ok(TaskOutput::with_outputs(result.outputs))
}

fn resolve_action_spec(
    action: &Action,
    dependency_results: &GraphResults,
) -> std::result::Result<toml::Table, TaskError> {
    resolve_spec(&action.spec, |reference| {
        dependency_results
            .find_execution(&reference.action)
            .and_then(|r| r.outputs.get(&reference.output).cloned())
    })
    .map_err(|missing| {
        TaskError::Execution(format!(
            "{} references ${{{missing}}} which is not available",
            action.describe()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfigGraph;
    use crate::config::model::{ActionConfig, DefaultsSection};
    use crate::types::ActionRef;

    fn action(kind: ActionKind, name: &str, raw: &str) -> Action {
        let raw: ActionConfig = toml::from_str(raw).unwrap();
        Action::merge(&DefaultsSection::default(), kind, name, &raw, "")
    }

    fn graph() -> StaticConfigGraph {
        StaticConfigGraph::from_actions(
            "test",
            [
                action(ActionKind::Build, "api", ""),
                action(ActionKind::Deploy, "db", ""),
                action(
                    ActionKind::Deploy,
                    "api",
                    r#"
build = "api"
spec.db = "${actions.deploy.db.outputs.url}"
"#,
                ),
            ],
        )
    }

    #[test]
    fn key_ignores_force_flags() {
        let g = graph();
        let a = g.action(&ActionRef::deploy("api")).unwrap();
        let plain = Task::execute(a.clone(), false);
        let forced = Task::execute(a, true).with_force_build(true);
        assert_eq!(plain.key(), forced.key());
        assert!(plain.key().as_str().starts_with("deploy.api.v-"));
    }

    #[test]
    fn process_keys_follow_their_children() {
        let g = graph();
        let build = Task::execute(g.action(&ActionRef::build("api")).unwrap(), false);
        let db = Task::execute(g.action(&ActionRef::deploy("db")).unwrap(), false);

        let one = Task::compound(ProcessMode::Dev, "session", vec![build.clone()]);
        let both = Task::compound(ProcessMode::Dev, "session", vec![build.clone(), db.clone()]);
        let reordered = Task::compound(ProcessMode::Dev, "session", vec![db, build]);

        assert_ne!(one.key(), both.key());
        assert_eq!(both.key(), reordered.key());
        // Forcing a child does not change the set.
        let forced = Task::compound(
            ProcessMode::Dev,
            "session",
            vec![Task::execute(g.action(&ActionRef::build("api")).unwrap(), true)],
        );
        assert_eq!(one.key(), forced.key());
    }

    #[test]
    fn keys_differ_across_task_types() {
        let g = graph();
        let a = g.action(&ActionRef::deploy("api")).unwrap();
        assert_ne!(Task::execute(a.clone(), false).key(), Task::resolve(a).key());
    }

    #[test]
    fn dependencies_include_declared_and_template_refs() {
        let g = graph();
        let task = Task::execute(g.action(&ActionRef::deploy("api")).unwrap(), false);
        let deps = task.resolve_dependencies(&g).unwrap();
        let types: Vec<(TaskType, String)> = deps
            .iter()
            .map(|t| (t.task_type(), t.name().to_string()))
            .collect();
        assert_eq!(
            types,
            vec![
                (TaskType::Build, "api".to_string()),
                (TaskType::Deploy, "db".to_string()),
            ]
        );
    }

    #[test]
    fn force_build_forces_only_build_dependencies() {
        let g = graph();
        let task = Task::execute(g.action(&ActionRef::deploy("api")).unwrap(), false)
            .with_force_build(true);
        let deps = task.resolve_dependencies(&g).unwrap();
        assert!(deps[0].force());
        assert!(!deps[1].force());
    }

    #[test]
    fn resolve_task_depends_on_referenced_actions_only() {
        let g = graph();
        let task = Task::resolve(g.action(&ActionRef::deploy("api")).unwrap());
        let deps = task.resolve_dependencies(&g).unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name(), "db");
    }

    #[test]
    fn self_reference_is_rejected() {
        let g = StaticConfigGraph::from_actions(
            "test",
            [action(ActionKind::Run, "seed", r#"dependencies = ["run.seed"]"#)],
        );
        let task = Task::execute(g.action(&ActionRef::run("seed")).unwrap(), false);
        let err = task.resolve_dependencies(&g).unwrap_err();
        assert!(matches!(err, DevgraphError::SelfReference(_)));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let g = StaticConfigGraph::from_actions(
            "test",
            [action(ActionKind::Deploy, "api", r#"build = "missing""#)],
        );
        let task = Task::execute(g.action(&ActionRef::deploy("api")).unwrap(), false);
        let err = task.resolve_dependencies(&g).unwrap_err();
        assert!(matches!(err, DevgraphError::UnknownAction(_)));
    }
}
