// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::{ActionKind, ActionRef};

/// Top-level project configuration as read from `Devgraph.toml`.
///
/// ```toml
/// [project]
/// name = "demo"
/// concurrency = 4
///
/// [defaults]
/// include = ["**/*"]
/// exclude = ["**/node_modules/**"]
///
/// [action.build.api]
/// spec.command = "docker build -t api ."
///
/// [action.deploy.api]
/// build = "api"
/// spec.command = "./deploy.sh"
/// ```
///
/// This is the raw, unvalidated shape. Use
/// [`crate::config::load_and_validate`] (or `ProjectConfig::try_from`) to get
/// a [`ProjectConfig`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawProjectConfig {
    #[serde(default)]
    pub project: ProjectSection,

    #[serde(default)]
    pub defaults: DefaultsSection,

    /// All actions from `[action.<kind>.<name>]`.
    #[serde(default)]
    pub action: ActionSections,
}

/// `[project]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSection {
    #[serde(default)]
    pub name: Option<String>,

    /// Maximum number of tasks processed at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Extra config files (relative to the project root) whose edits should
    /// trigger a configuration reload in watch mode.
    #[serde(default)]
    pub config_files: Vec<String>,
}

fn default_concurrency() -> usize {
    4
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            name: None,
            concurrency: default_concurrency(),
            config_files: Vec::new(),
        }
    }
}

/// `[defaults]` section, merged into every action by [`crate::config::Action::merge`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultsSection {
    /// Default timeout in seconds for every action.
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Source globs used when an action doesn't declare its own `include`.
    #[serde(default)]
    pub include: Vec<String>,

    /// Exclude globs used when an action doesn't declare its own `exclude`.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// `[action.<kind>]` tables.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ActionSections {
    #[serde(default)]
    pub build: BTreeMap<String, ActionConfig>,
    #[serde(default)]
    pub deploy: BTreeMap<String, ActionConfig>,
    #[serde(default)]
    pub run: BTreeMap<String, ActionConfig>,
    #[serde(default)]
    pub test: BTreeMap<String, ActionConfig>,
}

impl ActionSections {
    pub fn of_kind(&self, kind: ActionKind) -> &BTreeMap<String, ActionConfig> {
        match kind {
            ActionKind::Build => &self.build,
            ActionKind::Deploy => &self.deploy,
            ActionKind::Run => &self.run,
            ActionKind::Test => &self.test,
        }
    }

    pub fn of_kind_mut(&mut self, kind: ActionKind) -> &mut BTreeMap<String, ActionConfig> {
        match kind {
            ActionKind::Build => &mut self.build,
            ActionKind::Deploy => &mut self.deploy,
            ActionKind::Run => &mut self.run,
            ActionKind::Test => &mut self.test,
        }
    }

    pub fn get(&self, reference: &ActionRef) -> Option<&ActionConfig> {
        self.of_kind(reference.kind).get(&reference.name)
    }

    pub fn contains(&self, reference: &ActionRef) -> bool {
        self.get(reference).is_some()
    }

    pub fn insert(&mut self, kind: ActionKind, name: impl Into<String>, action: ActionConfig) {
        self.of_kind_mut(kind).insert(name.into(), action);
    }

    pub fn len(&self) -> usize {
        ActionKind::ALL.iter().map(|k| self.of_kind(*k).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over all actions as `(reference, config)`, kinds in
    /// build/deploy/run/test order and names sorted within a kind.
    pub fn iter(&self) -> impl Iterator<Item = (ActionRef, &ActionConfig)> {
        ActionKind::ALL.into_iter().flat_map(move |kind| {
            self.of_kind(kind)
                .iter()
                .map(move |(name, cfg)| (ActionRef::new(kind, name.clone()), cfg))
        })
    }
}

/// `[action.<kind>.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionConfig {
    /// Handler type, e.g. `"exec"`.
    #[serde(rename = "type", default = "default_action_type")]
    pub action_type: String,

    /// Module this action belongs to. Defaults to the action name.
    #[serde(default)]
    pub module: Option<String>,

    /// Shorthand for a dependency on `build.<name>`.
    #[serde(default)]
    pub build: Option<String>,

    /// Explicit dependencies, e.g. `["deploy.db", "run.migrate"]`.
    #[serde(default)]
    pub dependencies: Vec<ActionRef>,

    /// Timeout in seconds; falls back to `[defaults].timeout`.
    #[serde(default)]
    pub timeout: Option<u64>,

    #[serde(default)]
    pub disabled: bool,

    /// Source globs; if `None`, `[defaults].include` is used.
    #[serde(default)]
    pub include: Option<Vec<String>>,

    /// Exclude globs; if `None`, `[defaults].exclude` is used.
    #[serde(default)]
    pub exclude: Option<Vec<String>>,

    /// Handler-specific spec. String values may contain runtime output
    /// references such as `${actions.deploy.db.outputs.url}`.
    #[serde(default)]
    pub spec: toml::Table,
}

pub fn default_action_type() -> String {
    "exec".to_string()
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            action_type: default_action_type(),
            module: None,
            build: None,
            dependencies: Vec::new(),
            timeout: None,
            disabled: false,
            include: None,
            exclude: None,
            spec: toml::Table::new(),
        }
    }
}

impl ActionConfig {
    /// Statically declared dependencies: the `build` shorthand first, then
    /// `dependencies` in declaration order, without duplicates.
    pub fn declared_dependencies(&self) -> Vec<ActionRef> {
        let mut deps: Vec<ActionRef> = Vec::with_capacity(self.dependencies.len() + 1);
        if let Some(build) = &self.build {
            deps.push(ActionRef::build(build.clone()));
        }
        for dep in &self.dependencies {
            if !deps.contains(dep) {
                deps.push(dep.clone());
            }
        }
        deps
    }
}

/// Validated project configuration.
///
/// Constructed via `TryFrom<RawProjectConfig>` (see `config::validate`), which
/// guarantees every reference resolves and the dependency graph is acyclic.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub project: ProjectSection,
    pub defaults: DefaultsSection,
    pub action: ActionSections,
}

impl ProjectConfig {
    /// Build a config without running validation.
    ///
    /// Only meant for tests that need to feed deliberately broken graphs to
    /// the dependency resolver.
    pub fn new_unchecked(
        project: ProjectSection,
        defaults: DefaultsSection,
        action: ActionSections,
    ) -> Self {
        Self {
            project,
            defaults,
            action,
        }
    }

    pub fn name(&self) -> &str {
        self.project.name.as_deref().unwrap_or("project")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_action_tables_by_kind() {
        let raw: RawProjectConfig = toml::from_str(
            r#"
[project]
concurrency = 2

[action.build.api]
spec.command = "make"

[action.deploy.api]
build = "api"
dependencies = ["deploy.db"]
timeout = 30

[action.deploy.db]
type = "container"
"#,
        )
        .unwrap();

        assert_eq!(raw.project.concurrency, 2);
        assert_eq!(raw.action.len(), 3);

        let deploy = raw.action.get(&ActionRef::deploy("api")).unwrap();
        assert_eq!(deploy.action_type, "exec");
        assert_eq!(
            deploy.declared_dependencies(),
            vec![ActionRef::build("api"), ActionRef::deploy("db")]
        );
        assert_eq!(deploy.timeout, Some(30));

        let db = raw.action.get(&ActionRef::deploy("db")).unwrap();
        assert_eq!(db.action_type, "container");
    }

    #[test]
    fn invalid_dependency_reference_fails_to_parse() {
        let res: std::result::Result<RawProjectConfig, _> = toml::from_str(
            r#"
[action.deploy.api]
dependencies = ["api"]
"#,
        );
        assert!(res.is_err());
    }
}
