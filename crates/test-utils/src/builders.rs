//! Builders for in-memory projects.
//!
//! ```ignore
//! let graph = ProjectBuilder::new("shop")
//!     .action(ActionBuilder::build("api"))
//!     .action(ActionBuilder::deploy("api").build_from("api"))
//!     .build();
//! ```

use std::sync::Arc;
use std::time::Duration;

use devgraph::config::{Action, ActionConfig, ConfigGraph, DefaultsSection, StaticConfigGraph};
use devgraph::types::{ActionKind, ActionRef};

/// One action of a [`ProjectBuilder`].
#[derive(Debug, Clone)]
pub struct ActionBuilder {
    kind: ActionKind,
    name: String,
    raw: ActionConfig,
    timeout: Option<Duration>,
    source_hash: String,
}

impl ActionBuilder {
    pub fn new(kind: ActionKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            raw: ActionConfig::default(),
            timeout: None,
            source_hash: String::new(),
        }
    }

    pub fn build(name: impl Into<String>) -> Self {
        Self::new(ActionKind::Build, name)
    }

    pub fn deploy(name: impl Into<String>) -> Self {
        Self::new(ActionKind::Deploy, name)
    }

    pub fn run(name: impl Into<String>) -> Self {
        Self::new(ActionKind::Run, name)
    }

    pub fn test(name: impl Into<String>) -> Self {
        Self::new(ActionKind::Test, name)
    }

    /// Depend on `build.<name>` via the `build` shorthand.
    pub fn build_from(mut self, name: impl Into<String>) -> Self {
        self.raw.build = Some(name.into());
        self
    }

    /// Add an explicit dependency, e.g. `"deploy.db"`.
    pub fn depends_on(mut self, reference: &str) -> Self {
        let reference: ActionRef = reference
            .parse()
            .unwrap_or_else(|e| panic!("bad reference in test project: {e}"));
        self.raw.dependencies.push(reference);
        self
    }

    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.raw.module = Some(module.into());
        self
    }

    pub fn action_type(mut self, action_type: impl Into<String>) -> Self {
        self.raw.action_type = action_type.into();
        self
    }

    pub fn spec(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.raw.spec.insert(key.to_string(), value.into());
        self
    }

    pub fn command(self, command: &str) -> Self {
        self.spec("command", command)
    }

    pub fn include(mut self, globs: &[&str]) -> Self {
        self.raw.include = Some(globs.iter().map(|g| g.to_string()).collect());
        self
    }

    /// Sub-second timeouts aren't expressible in TOML, so this bypasses the
    /// config table.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.raw.disabled = true;
        self
    }

    /// Pretend the action's sources hash to `hash`; changes the version.
    pub fn source_hash(mut self, hash: impl Into<String>) -> Self {
        self.source_hash = hash.into();
        self
    }

    pub fn finish(self) -> Action {
        let mut action = Action::merge(
            &DefaultsSection::default(),
            self.kind,
            &self.name,
            &self.raw,
            &self.source_hash,
        );
        if self.timeout.is_some() {
            action.timeout = self.timeout;
        }
        action
    }
}

/// An in-memory project.
#[derive(Debug, Clone)]
pub struct ProjectBuilder {
    name: String,
    concurrency: usize,
    actions: Vec<ActionBuilder>,
}

impl ProjectBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            concurrency: 4,
            actions: Vec::new(),
        }
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn action(mut self, action: ActionBuilder) -> Self {
        self.actions.push(action);
        self
    }

    pub fn build(self) -> StaticConfigGraph {
        StaticConfigGraph::from_actions(
            self.name,
            self.actions.into_iter().map(ActionBuilder::finish),
        )
        .with_concurrency(self.concurrency)
    }

    pub fn build_arc(self) -> Arc<dyn ConfigGraph> {
        Arc::new(self.build())
    }
}

/// The project most tests start from:
///
/// - `build.api`
/// - `deploy.db`
/// - `deploy.api` (build `api`, depends on `deploy.db`)
/// - `test.api` (build `api`, depends on `deploy.api`)
/// - `build.web`, `deploy.web` (build `web`, depends on `deploy.api`)
pub fn shop_project() -> ProjectBuilder {
    ProjectBuilder::new("shop")
        .action(ActionBuilder::build("api"))
        .action(ActionBuilder::deploy("db"))
        .action(
            ActionBuilder::deploy("api")
                .build_from("api")
                .depends_on("deploy.db"),
        )
        .action(
            ActionBuilder::test("api")
                .build_from("api")
                .depends_on("deploy.api"),
        )
        .action(ActionBuilder::build("web"))
        .action(
            ActionBuilder::deploy("web")
                .build_from("web")
                .depends_on("deploy.api"),
        )
}
