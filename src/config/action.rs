// src/config/action.rs

use std::time::Duration;

use blake3::Hasher;

use crate::config::model::{ActionConfig, DefaultsSection};
use crate::config::validate::all_dependencies;
use crate::types::{ActionKind, ActionRef};

/// Version used when no source hash is available.
pub const UNVERSIONED: &str = "v-0000000000";

/// A fully merged, immutable action.
///
/// Produced by [`Action::merge`] from an `[action.<kind>.<name>]` table and
/// the project `[defaults]`. Nothing mutates an `Action` after construction;
/// a config reload produces new values.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    pub name: String,
    pub action_type: String,
    pub module: String,
    pub version: String,
    /// Declared dependencies followed by actions referenced from `spec`
    /// output templates.
    pub dependencies: Vec<ActionRef>,
    pub timeout: Option<Duration>,
    pub disabled: bool,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub spec: toml::Table,
}

impl Action {
    /// Merge a raw action table with the project defaults.
    ///
    /// `source_hash` is the aggregate content hash of the action's source
    /// files (empty when unknown); it feeds into the version together with
    /// the merged config.
    pub fn merge(
        defaults: &DefaultsSection,
        kind: ActionKind,
        name: &str,
        raw: &ActionConfig,
        source_hash: &str,
    ) -> Self {
        let mut action = Self {
            kind,
            name: name.to_string(),
            action_type: raw.action_type.clone(),
            module: raw.module.clone().unwrap_or_else(|| name.to_string()),
            version: UNVERSIONED.to_string(),
            dependencies: all_dependencies(raw),
            timeout: raw.timeout.or(defaults.timeout).map(Duration::from_secs),
            disabled: raw.disabled,
            include: raw.include.clone().unwrap_or_else(|| defaults.include.clone()),
            exclude: raw.exclude.clone().unwrap_or_else(|| defaults.exclude.clone()),
            spec: raw.spec.clone(),
        };
        action.version = compute_version(&action.config_digest(), source_hash);
        action
    }

    /// Replace the version, e.g. after the source hash changed.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn reference(&self) -> ActionRef {
        ActionRef::new(self.kind, self.name.clone())
    }

    /// `"<kind>.<name>"`.
    pub fn describe(&self) -> String {
        format!("{}.{}", self.kind, self.name)
    }

    /// Hash over every field that influences what the action does.
    pub fn config_digest(&self) -> String {
        let mut hasher = Hasher::new();
        let mut field = |label: &str, value: &str| {
            hasher.update(label.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        };

        field("kind", self.kind.as_str());
        field("name", &self.name);
        field("type", &self.action_type);
        field("module", &self.module);
        for dep in &self.dependencies {
            field("dependency", &dep.to_string());
        }
        if let Some(timeout) = self.timeout {
            field("timeout", &timeout.as_secs().to_string());
        }
        field("disabled", if self.disabled { "true" } else { "false" });
        for pattern in &self.include {
            field("include", pattern);
        }
        for pattern in &self.exclude {
            field("exclude", pattern);
        }
        field("spec", &toml::Value::Table(self.spec.clone()).to_string());

        hasher.finalize().to_hex().to_string()
    }
}

/// `v-` followed by the first 10 hex chars of `blake3(config_digest ++ source_hash)`.
pub fn compute_version(config_digest: &str, source_hash: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(config_digest.as_bytes());
    hasher.update(source_hash.as_bytes());
    let hex = hasher.finalize().to_hex();
    format!("v-{}", &hex.as_str()[..10])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(src: &str) -> ActionConfig {
        toml::from_str(src).unwrap()
    }

    #[test]
    fn merge_applies_defaults() {
        let defaults = DefaultsSection {
            timeout: Some(60),
            include: vec!["src/**".into()],
            exclude: vec!["**/*.tmp".into()],
        };
        let action = Action::merge(&defaults, ActionKind::Build, "api", &raw(""), "");

        assert_eq!(action.module, "api");
        assert_eq!(action.action_type, "exec");
        assert_eq!(action.timeout, Some(Duration::from_secs(60)));
        assert_eq!(action.include, vec!["src/**".to_string()]);
        assert_eq!(action.exclude, vec!["**/*.tmp".to_string()]);
        assert!(action.version.starts_with("v-"));
        assert_eq!(action.version.len(), 12);
    }

    #[test]
    fn action_values_override_defaults() {
        let defaults = DefaultsSection {
            timeout: Some(60),
            include: vec!["src/**".into()],
            exclude: vec![],
        };
        let action = Action::merge(
            &defaults,
            ActionKind::Deploy,
            "api",
            &raw(
                r#"
module = "backend"
timeout = 5
include = ["api/**"]
build = "api"
spec.url = "${actions.deploy.db.outputs.url}"
"#,
            ),
            "",
        );

        assert_eq!(action.module, "backend");
        assert_eq!(action.timeout, Some(Duration::from_secs(5)));
        assert_eq!(action.include, vec!["api/**".to_string()]);
        assert_eq!(
            action.dependencies,
            vec![ActionRef::build("api"), ActionRef::deploy("db")]
        );
    }

    #[test]
    fn version_tracks_config_and_sources() {
        let defaults = DefaultsSection::default();
        let a = Action::merge(&defaults, ActionKind::Build, "api", &raw(r#"spec.command = "make""#), "h1");
        let same = Action::merge(&defaults, ActionKind::Build, "api", &raw(r#"spec.command = "make""#), "h1");
        let other_src = Action::merge(&defaults, ActionKind::Build, "api", &raw(r#"spec.command = "make""#), "h2");
        let other_cfg = Action::merge(&defaults, ActionKind::Build, "api", &raw(r#"spec.command = "make all""#), "h1");

        assert_eq!(a.version, same.version);
        assert_ne!(a.version, other_src.version);
        assert_ne!(a.version, other_cfg.version);
    }
}
