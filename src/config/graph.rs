// src/config/graph.rs

//! Point-in-time view of the declared action topology.
//!
//! The orchestrator never mutates a [`ConfigGraph`]; a reload builds a new
//! one (see [`ConfigSource`]) and swaps the `Arc`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::config::action::Action;
use crate::config::model::ProjectConfig;
use crate::errors::{DevgraphError, Result};
use crate::router::BoxFuture;
use crate::types::{ActionKind, ActionRef};
use crate::watch::hash::compute_source_hash;
use crate::watch::patterns::SourceProfile;

/// Actions grouped under one `module` name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub actions: Vec<ActionRef>,
}

impl Module {
    /// Names of this module's actions of the given kind.
    pub fn actions_of(&self, kind: ActionKind) -> impl Iterator<Item = &ActionRef> {
        self.actions.iter().filter(move |a| a.kind == kind)
    }
}

/// Options for [`ConfigGraph::dependencies`] and [`ConfigGraph::dependants`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyQuery {
    /// Follow edges transitively.
    pub recursive: bool,
    /// Only return actions of this kind (traversal still crosses other kinds).
    pub kind: Option<ActionKind>,
}

impl DependencyQuery {
    pub fn direct() -> Self {
        Self::default()
    }

    pub fn recursive() -> Self {
        Self {
            recursive: true,
            kind: None,
        }
    }

    pub fn of_kind(mut self, kind: ActionKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Read-only access to the project's actions and their declared edges.
pub trait ConfigGraph: Send + Sync + fmt::Debug {
    fn project_name(&self) -> &str;

    /// Project root, if the graph was loaded from disk.
    fn root(&self) -> Option<&Path>;

    /// Worker-pool bound requested by the project.
    fn concurrency(&self) -> usize;

    /// Root-relative config files whose edits trigger a reload.
    fn config_files(&self) -> &[String];

    /// All actions, optionally restricted to one kind.
    fn actions(&self, kind: Option<ActionKind>) -> Vec<Arc<Action>>;

    fn action(&self, reference: &ActionRef) -> Result<Arc<Action>>;

    fn dependencies(&self, reference: &ActionRef, query: DependencyQuery)
    -> Result<Vec<Arc<Action>>>;

    fn dependants(&self, reference: &ActionRef, query: DependencyQuery) -> Result<Vec<Arc<Action>>>;

    fn module(&self, name: &str) -> Result<Module>;

    fn modules(&self) -> Vec<Module>;
}

/// Produces fresh [`ConfigGraph`] snapshots.
///
/// Used for the initial load, for restarts and for trial reloads while
/// watching. Errors for which [`DevgraphError::is_configuration`] holds are
/// recoverable during a watch session.
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> BoxFuture<'_, Result<Arc<dyn ConfigGraph>>>;
}

/// In-memory [`ConfigGraph`] built once from a validated project config.
#[derive(Debug, Clone)]
pub struct StaticConfigGraph {
    name: String,
    root: Option<PathBuf>,
    concurrency: usize,
    config_files: Vec<String>,
    actions: BTreeMap<ActionRef, Arc<Action>>,
}

impl StaticConfigGraph {
    /// Build a graph from a validated config.
    ///
    /// With a `root`, every action is versioned from the content of its
    /// source files; otherwise only the config contributes to versions.
    pub fn from_config(cfg: &ProjectConfig, root: Option<&Path>) -> Result<Self> {
        let mut source_hashes: HashMap<(Vec<String>, Vec<String>), String> = HashMap::new();
        let mut actions = Vec::with_capacity(cfg.action.len());

        for (reference, raw) in cfg.action.iter() {
            let unversioned = Action::merge(&cfg.defaults, reference.kind, &reference.name, raw, "");
            let action = match root {
                Some(root) => {
                    let key = (unversioned.include.clone(), unversioned.exclude.clone());
                    let source_hash = match source_hashes.get(&key) {
                        Some(hash) => hash.clone(),
                        None => {
                            let profile = SourceProfile::for_action(&unversioned)?;
                            let hash = compute_source_hash(root, &profile)?;
                            source_hashes.insert(key, hash.clone());
                            hash
                        }
                    };
                    Action::merge(&cfg.defaults, reference.kind, &reference.name, raw, &source_hash)
                }
                None => unversioned,
            };
            debug!(action = %reference, version = %action.version, "loaded action");
            actions.push(action);
        }

        let mut config_files = vec![crate::config::loader::DEFAULT_CONFIG_FILE.to_string()];
        config_files.extend(cfg.project.config_files.iter().cloned());

        Ok(Self {
            name: cfg.name().to_string(),
            root: root.map(Path::to_path_buf),
            concurrency: cfg.project.concurrency,
            config_files,
            actions: actions
                .into_iter()
                .map(|a| (a.reference(), Arc::new(a)))
                .collect(),
        })
    }

    /// Build a graph straight from merged actions, without validation.
    ///
    /// References may dangle and edges may form cycles; the resolver reports
    /// both when it expands tasks.
    pub fn from_actions(name: impl Into<String>, actions: impl IntoIterator<Item = Action>) -> Self {
        Self {
            name: name.into(),
            root: None,
            concurrency: 4,
            config_files: Vec::new(),
            actions: actions
                .into_iter()
                .map(|a| (a.reference(), Arc::new(a)))
                .collect(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_config_files(mut self, files: Vec<String>) -> Self {
        self.config_files = files;
        self
    }

    fn walk(
        &self,
        start: &ActionRef,
        query: DependencyQuery,
        edges: impl Fn(&ActionRef) -> Result<Vec<ActionRef>>,
    ) -> Result<Vec<Arc<Action>>> {
        let mut seen: BTreeSet<ActionRef> = BTreeSet::new();
        let mut out = Vec::new();
        let mut stack: Vec<ActionRef> = edges(start)?.into_iter().rev().collect();

        while let Some(next) = stack.pop() {
            if &next == start || !seen.insert(next.clone()) {
                continue;
            }
            let action = self.action(&next)?;
            if query.recursive {
                stack.extend(edges(&next)?.into_iter().rev());
            }
            if query.kind.is_none_or(|k| k == action.kind) {
                out.push(action);
            }
        }
        Ok(out)
    }
}

impl ConfigGraph for StaticConfigGraph {
    fn project_name(&self) -> &str {
        &self.name
    }

    fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn concurrency(&self) -> usize {
        self.concurrency
    }

    fn config_files(&self) -> &[String] {
        &self.config_files
    }

    fn actions(&self, kind: Option<ActionKind>) -> Vec<Arc<Action>> {
        self.actions
            .values()
            .filter(|a| kind.is_none_or(|k| k == a.kind))
            .cloned()
            .collect()
    }

    fn action(&self, reference: &ActionRef) -> Result<Arc<Action>> {
        self.actions
            .get(reference)
            .cloned()
            .ok_or_else(|| DevgraphError::UnknownAction(reference.to_string()))
    }

    fn dependencies(
        &self,
        reference: &ActionRef,
        query: DependencyQuery,
    ) -> Result<Vec<Arc<Action>>> {
        self.walk(reference, query, |r| Ok(self.action(r)?.dependencies.clone()))
    }

    fn dependants(&self, reference: &ActionRef, query: DependencyQuery) -> Result<Vec<Arc<Action>>> {
        self.action(reference)?;
        self.walk(reference, query, |r| {
            Ok(self
                .actions
                .values()
                .filter(|a| a.dependencies.contains(r))
                .map(|a| a.reference())
                .collect())
        })
    }

    fn module(&self, name: &str) -> Result<Module> {
        let actions: Vec<ActionRef> = self
            .actions
            .values()
            .filter(|a| a.module == name)
            .map(|a| a.reference())
            .collect();
        if actions.is_empty() {
            return Err(DevgraphError::ConfigError(format!("unknown module '{name}'")));
        }
        Ok(Module {
            name: name.to_string(),
            actions,
        })
    }

    fn modules(&self) -> Vec<Module> {
        let mut grouped: BTreeMap<&str, Vec<ActionRef>> = BTreeMap::new();
        for action in self.actions.values() {
            grouped
                .entry(action.module.as_str())
                .or_default()
                .push(action.reference());
        }
        grouped
            .into_iter()
            .map(|(name, actions)| Module {
                name: name.to_string(),
                actions,
            })
            .collect()
    }
}
