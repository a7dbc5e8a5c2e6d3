// src/config/template.rs

//! Runtime output references inside action specs.
//!
//! A string such as `"postgres://${actions.deploy.db.outputs.host}:5432"`
//! can only be computed once `deploy.db` has executed, so every reference
//! found here becomes an execution-order dependency of the action that
//! contains it. `services` and `tasks` are accepted as aliases for `deploy`
//! and `run`.

use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::types::{ActionKind, ActionRef};

static OUTPUT_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\$\{\s*actions\.(build|deploy|run|test|services|tasks)\.([A-Za-z0-9][A-Za-z0-9_-]*)\.outputs\.([A-Za-z0-9_][A-Za-z0-9_-]*)\s*\}",
    )
    .expect("output reference pattern is valid")
});

/// A single `${actions.<kind>.<name>.outputs.<key>}` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputReference {
    pub action: ActionRef,
    pub output: String,
}

impl fmt::Display for OutputReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "actions.{}.{}.outputs.{}",
            self.action.kind, self.action.name, self.output
        )
    }
}

fn kind_from_segment(segment: &str) -> ActionKind {
    match segment {
        "build" => ActionKind::Build,
        "deploy" | "services" => ActionKind::Deploy,
        "run" | "tasks" => ActionKind::Run,
        _ => ActionKind::Test,
    }
}

fn reference_from_captures(caps: &Captures<'_>) -> OutputReference {
    OutputReference {
        action: ActionRef::new(kind_from_segment(&caps[1]), &caps[2]),
        output: caps[3].to_string(),
    }
}

/// All output references in a spec, in order of first appearance.
pub fn output_references(spec: &toml::Table) -> Vec<OutputReference> {
    let mut found = Vec::new();
    for value in spec.values() {
        collect_value(value, &mut found);
    }
    found
}

/// Distinct actions referenced by a spec, in order of first appearance.
pub fn referenced_actions(spec: &toml::Table) -> Vec<ActionRef> {
    let mut actions: Vec<ActionRef> = Vec::new();
    for reference in output_references(spec) {
        if !actions.contains(&reference.action) {
            actions.push(reference.action);
        }
    }
    actions
}

fn collect_value(value: &toml::Value, found: &mut Vec<OutputReference>) {
    match value {
        toml::Value::String(s) => {
            for caps in OUTPUT_REF.captures_iter(s) {
                let reference = reference_from_captures(&caps);
                if !found.contains(&reference) {
                    found.push(reference);
                }
            }
        }
        toml::Value::Array(items) => {
            for item in items {
                collect_value(item, found);
            }
        }
        toml::Value::Table(table) => {
            for item in table.values() {
                collect_value(item, found);
            }
        }
        _ => {}
    }
}

/// Substitute every output reference in `spec` using `lookup`.
///
/// Returns the first reference `lookup` could not answer.
pub fn resolve_spec<F>(spec: &toml::Table, lookup: F) -> Result<toml::Table, OutputReference>
where
    F: Fn(&OutputReference) -> Option<String>,
{
    resolve_table(spec, &lookup)
}

type Lookup<'a> = &'a dyn Fn(&OutputReference) -> Option<String>;

fn resolve_table(spec: &toml::Table, lookup: Lookup<'_>) -> Result<toml::Table, OutputReference> {
    let mut resolved = toml::Table::new();
    for (key, value) in spec.iter() {
        resolved.insert(key.clone(), resolve_value(value, lookup)?);
    }
    Ok(resolved)
}

fn resolve_value(value: &toml::Value, lookup: Lookup<'_>) -> Result<toml::Value, OutputReference> {
    match value {
        toml::Value::String(s) => Ok(toml::Value::String(resolve_str(s, lookup)?)),
        toml::Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, lookup))
            .collect::<Result<Vec<_>, _>>()
            .map(toml::Value::Array),
        toml::Value::Table(table) => resolve_table(table, lookup).map(toml::Value::Table),
        other => Ok(other.clone()),
    }
}

fn resolve_str(s: &str, lookup: Lookup<'_>) -> Result<String, OutputReference> {
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in OUTPUT_REF.captures_iter(s) {
        let Some(whole) = caps.get(0) else { continue };
        let reference = reference_from_captures(&caps);
        let value = lookup(&reference).ok_or(reference)?;
        out.push_str(&s[last..whole.start()]);
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&s[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(src: &str) -> toml::Table {
        toml::from_str(src).unwrap()
    }

    #[test]
    fn finds_references_in_nested_values() {
        let spec = spec(
            r#"
command = "echo ${actions.build.api.outputs.image}"
env = { DB = "${actions.services.db.outputs.url}", N = 1 }
args = ["${ actions.tasks.seed.outputs.log }", "plain"]
"#,
        );

        let actions = referenced_actions(&spec);
        assert_eq!(actions.len(), 3);
        assert!(actions.contains(&ActionRef::build("api")));
        assert!(actions.contains(&ActionRef::deploy("db")));
        assert!(actions.contains(&ActionRef::run("seed")));
    }

    #[test]
    fn repeated_references_are_reported_once() {
        let spec = spec(
            r#"command = "${actions.build.api.outputs.a} ${actions.build.api.outputs.a} ${actions.build.api.outputs.b}""#,
        );
        assert_eq!(output_references(&spec).len(), 2);
        assert_eq!(referenced_actions(&spec), vec![ActionRef::build("api")]);
    }

    #[test]
    fn ignores_non_output_templates() {
        let spec = spec(r#"command = "echo ${var.name} ${actions.build.api.version}""#);
        assert!(output_references(&spec).is_empty());
    }

    #[test]
    fn resolves_references_from_lookup() {
        let spec = spec(
            r#"
url = "http://${actions.deploy.api.outputs.host}:${actions.deploy.api.outputs.port}/"
nested = { image = "${actions.build.api.outputs.image}" }
"#,
        );

        let resolved = resolve_spec(&spec, |r| match r.output.as_str() {
            "host" => Some("localhost".into()),
            "port" => Some("8080".into()),
            "image" => Some("api:v-1".into()),
            _ => None,
        })
        .unwrap();

        assert_eq!(resolved["url"].as_str(), Some("http://localhost:8080/"));
        assert_eq!(resolved["nested"]["image"].as_str(), Some("api:v-1"));
    }

    #[test]
    fn reports_unresolved_reference() {
        let spec = spec(r#"url = "${actions.deploy.api.outputs.missing}""#);
        let err = resolve_spec(&spec, |_| None).unwrap_err();
        assert_eq!(err.to_string(), "actions.deploy.api.outputs.missing");
    }
}
