// src/dag/resolver.rs

//! Expands requested tasks into their full dependency closure.
//!
//! Nothing is executed here. The output is a set of tasks keyed by
//! [`TaskKey`] together with their direct dependency edges, in an order where
//! every task appears after all of its dependencies.

use std::collections::BTreeMap;

use tracing::trace;

use crate::config::ConfigGraph;
use crate::errors::{DevgraphError, Result};
use crate::task::{Task, TaskKey};

/// One task of an [`Expansion`] plus the keys it waits on.
#[derive(Debug, Clone)]
pub struct ExpandedTask {
    pub task: Task,
    pub dependencies: Vec<TaskKey>,
}

#[derive(Debug, Clone, Default)]
pub struct Expansion {
    /// Keys of the tasks that were requested.
    pub roots: Vec<TaskKey>,
    pub nodes: BTreeMap<TaskKey, ExpandedTask>,
    /// Dependencies before dependants.
    pub order: Vec<TaskKey>,
}

impl Expansion {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn get(&self, key: &TaskKey) -> Option<&ExpandedTask> {
        self.nodes.get(key)
    }

    /// Tasks in dependency order.
    pub fn iter(&self) -> impl Iterator<Item = (&TaskKey, &ExpandedTask)> {
        self.order
            .iter()
            .filter_map(|k| self.nodes.get(k).map(|n| (k, n)))
    }

    /// Fold `other` into `self`. A forced occurrence wins over a plain one.
    pub fn merge(&mut self, other: Expansion) {
        let Expansion {
            roots,
            mut nodes,
            order,
        } = other;
        for key in order {
            let Some(node) = nodes.remove(&key) else {
                continue;
            };
            match self.nodes.get_mut(&key) {
                Some(existing) => {
                    upgrade_flags(&mut existing.task, &node.task);
                }
                None => {
                    self.nodes.insert(key.clone(), node);
                    self.order.push(key);
                }
            }
        }
        for root in roots {
            if !self.roots.contains(&root) {
                self.roots.push(root);
            }
        }
    }
}

/// Expand `tasks` against `graph`.
///
/// Fails with [`DevgraphError::DependencyCycle`] naming the actions on the
/// cycle in order, or with the resolver error of the first task whose
/// dependencies can't be resolved (unknown or self reference).
pub fn expand(tasks: &[Task], graph: &dyn ConfigGraph) -> Result<Expansion> {
    let mut resolver = Resolver {
        graph,
        expansion: Expansion::default(),
        path: Vec::new(),
    };
    for task in tasks {
        let key = resolver.visit(task.clone())?;
        if !resolver.expansion.roots.contains(&key) {
            resolver.expansion.roots.push(key);
        }
    }
    Ok(resolver.expansion)
}

/// Carry `force` and `force_build` from `incoming` over to `existing`.
///
/// Returns which of the two flags were newly set.
fn upgrade_flags(existing: &mut Task, incoming: &Task) -> (bool, bool) {
    let force = incoming.force() && !existing.force();
    let force_build = incoming.force_build() && !existing.force_build();
    if force {
        *existing = existing.clone().with_force(true);
    }
    if force_build {
        *existing = existing.clone().with_force_build(true);
    }
    (force, force_build)
}

struct Resolver<'g> {
    graph: &'g dyn ConfigGraph,
    expansion: Expansion,
    /// Current DFS path: key and display name.
    path: Vec<(TaskKey, String)>,
}

impl Resolver<'_> {
    fn visit(&mut self, task: Task) -> Result<TaskKey> {
        let key = task.key();

        if let Some(pos) = self.path.iter().position(|(k, _)| *k == key) {
            let mut names: Vec<String> = self.path[pos..].iter().map(|(_, n)| n.clone()).collect();
            names.push(self.path[pos].1.clone());
            return Err(DevgraphError::DependencyCycle { path: names });
        }

        if let Some(existing) = self.expansion.nodes.get_mut(&key) {
            let (task_upgraded, builds_forced) = upgrade_flags(&mut existing.task, &task);
            if task_upgraded {
                trace!(task = %key, "upgraded to forced");
            }
            if builds_forced {
                // Already expanded; revisiting only upgrades the Build deps.
                for dep in task.resolve_dependencies(self.graph)? {
                    self.visit(dep)?;
                }
            }
            return Ok(key);
        }

        let name = match task.action() {
            Some(action) => action.describe(),
            None => task.name().to_string(),
        };
        self.path.push((key.clone(), name));

        let mut dependencies = Vec::new();
        for dep in task.resolve_dependencies(self.graph)? {
            let dep_key = self.visit(dep)?;
            if dep_key != key && !dependencies.contains(&dep_key) {
                dependencies.push(dep_key);
            }
        }

        self.path.pop();
        trace!(task = %key, deps = dependencies.len(), "expanded task");

        self.expansion
            .nodes
            .insert(key.clone(), ExpandedTask { task, dependencies });
        self.expansion.order.push(key.clone());
        Ok(key)
    }
}
