// src/config/validate.rs

use std::collections::{BTreeMap, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ActionConfig, ProjectConfig, RawProjectConfig};
use crate::config::template::referenced_actions;
use crate::errors::{DevgraphError, Result};
use crate::types::ActionRef;

impl TryFrom<RawProjectConfig> for ProjectConfig {
    type Error = DevgraphError;

    fn try_from(raw: RawProjectConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ProjectConfig::new_unchecked(raw.project, raw.defaults, raw.action))
    }
}

/// Run every semantic check on a raw config without consuming it.
pub fn validate_config(cfg: &RawProjectConfig) -> Result<()> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawProjectConfig) -> Result<()> {
    ensure_has_actions(cfg)?;
    validate_project_section(cfg)?;
    validate_action_references(cfg)?;
    validate_acyclic(cfg)?;
    Ok(())
}

fn ensure_has_actions(cfg: &RawProjectConfig) -> Result<()> {
    if cfg.action.is_empty() {
        return Err(DevgraphError::ConfigError(
            "config must contain at least one [action.<kind>.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_project_section(cfg: &RawProjectConfig) -> Result<()> {
    if cfg.project.concurrency == 0 {
        return Err(DevgraphError::ConfigError(
            "[project].concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

/// Declared dependencies plus actions referenced through output templates.
pub(crate) fn all_dependencies(action: &ActionConfig) -> Vec<ActionRef> {
    let mut deps = action.declared_dependencies();
    for referenced in referenced_actions(&action.spec) {
        if !deps.contains(&referenced) {
            deps.push(referenced);
        }
    }
    deps
}

fn validate_action_references(cfg: &RawProjectConfig) -> Result<()> {
    for (reference, action) in cfg.action.iter() {
        for dep in all_dependencies(action) {
            if dep == reference {
                return Err(DevgraphError::SelfReference(reference.to_string()));
            }
            if !cfg.action.contains(&dep) {
                return Err(DevgraphError::UnknownAction(format!(
                    "{dep} (referenced by {reference})"
                )));
            }
        }
    }
    Ok(())
}

fn validate_acyclic(cfg: &RawProjectConfig) -> Result<()> {
    // Edge direction: action -> dependency.
    let refs: Vec<ActionRef> = cfg.action.iter().map(|(r, _)| r).collect();
    let index: BTreeMap<&ActionRef, usize> = refs.iter().enumerate().map(|(i, r)| (r, i)).collect();

    let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
    for i in 0..refs.len() {
        graph.add_node(i);
    }
    for (reference, action) in cfg.action.iter() {
        let from = index[&reference];
        for dep in all_dependencies(action) {
            if let Some(&to) = index.get(&dep) {
                graph.add_edge(from, to, ());
            }
        }
    }

    for component in tarjan_scc(&graph) {
        if component.len() > 1 {
            let path = cycle_path(&graph, &component)
                .into_iter()
                .map(|i| refs[i].to_string())
                .collect();
            return Err(DevgraphError::DependencyCycle { path });
        }
    }
    Ok(())
}

/// Reconstruct one concrete cycle inside a strongly connected component,
/// starting and ending at its smallest node.
fn cycle_path(graph: &DiGraphMap<usize, ()>, component: &[usize]) -> Vec<usize> {
    let Some(&start) = component.iter().min() else {
        return Vec::new();
    };

    // BFS from `start` restricted to the component until an edge leads back.
    let mut parent: BTreeMap<usize, usize> = BTreeMap::new();
    let mut queue = VecDeque::from([start]);
    let mut last = start;

    'search: while let Some(node) = queue.pop_front() {
        let mut next: Vec<usize> = graph.neighbors(node).collect();
        next.sort_unstable();
        for n in next {
            if !component.contains(&n) {
                continue;
            }
            if n == start {
                last = node;
                break 'search;
            }
            if !parent.contains_key(&n) {
                parent.insert(n, node);
                queue.push_back(n);
            }
        }
    }

    let mut path = vec![start];
    let mut cursor = last;
    while cursor != start {
        path.push(cursor);
        match parent.get(&cursor) {
            Some(&p) => cursor = p,
            None => break,
        }
    }
    path.push(start);
    let n = path.len();
    path[1..n - 1].reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(src: &str) -> RawProjectConfig {
        toml::from_str(src).unwrap()
    }

    #[test]
    fn empty_config_is_rejected() {
        let err = ProjectConfig::try_from(raw("")).unwrap_err();
        assert!(matches!(err, DevgraphError::ConfigError(_)));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = ProjectConfig::try_from(raw(
            r#"
[project]
concurrency = 0

[action.build.api]
"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let err = ProjectConfig::try_from(raw(
            r#"
[action.deploy.api]
build = "missing"
"#,
        ))
        .unwrap_err();
        assert!(matches!(err, DevgraphError::UnknownAction(ref s) if s.contains("build.missing")));
    }

    #[test]
    fn unknown_template_reference_is_rejected() {
        let err = ProjectConfig::try_from(raw(
            r#"
[action.deploy.api]
spec.command = "echo ${actions.deploy.db.outputs.url}"
"#,
        ))
        .unwrap_err();
        assert!(matches!(err, DevgraphError::UnknownAction(_)));
    }

    #[test]
    fn self_reference_is_rejected() {
        let err = ProjectConfig::try_from(raw(
            r#"
[action.run.seed]
dependencies = ["run.seed"]
"#,
        ))
        .unwrap_err();
        assert!(matches!(err, DevgraphError::SelfReference(ref s) if s == "run.seed"));
    }

    #[test]
    fn cycle_reports_full_path() {
        let err = ProjectConfig::try_from(raw(
            r#"
[action.deploy.a]
dependencies = ["deploy.b"]

[action.deploy.b]
dependencies = ["deploy.c"]

[action.deploy.c]
dependencies = ["deploy.a"]
"#,
        ))
        .unwrap_err();

        match err {
            DevgraphError::DependencyCycle { path } => {
                assert_eq!(path, vec!["deploy.a", "deploy.b", "deploy.c", "deploy.a"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn cycle_through_template_reference_is_detected() {
        let err = ProjectConfig::try_from(raw(
            r#"
[action.deploy.a]
spec.url = "${actions.deploy.b.outputs.url}"

[action.deploy.b]
dependencies = ["deploy.a"]
"#,
        ))
        .unwrap_err();
        assert!(matches!(err, DevgraphError::DependencyCycle { .. }));
    }

    #[test]
    fn valid_graph_passes() {
        let cfg = ProjectConfig::try_from(raw(
            r#"
[action.build.api]

[action.deploy.api]
build = "api"

[action.test.api]
build = "api"
spec.url = "${actions.deploy.api.outputs.url}"
"#,
        ))
        .unwrap();
        assert_eq!(cfg.action.len(), 3);
    }
}
