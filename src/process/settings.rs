// src/process/settings.rs

//! Which modules and actions are in scope while a dev session runs.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

pub const WILDCARD: &str = "*";

/// Process-wide filters, mutated between watch iterations by remote
/// requests and read by the planner.
///
/// Every list holds names or the single wildcard `"*"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSettings {
    /// Modules rebuilt when their sources change.
    pub build_modules: Vec<String>,
    /// Deploy actions deployed initially and redeployed on change.
    pub deploy_names: Vec<String>,
    /// Modules whose tests run.
    pub test_modules: Vec<String>,
    /// Glob filters on test action names; empty means all.
    pub test_names: Vec<String>,
    pub dev_mode_names: Vec<String>,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            build_modules: wildcard(),
            deploy_names: wildcard(),
            test_modules: wildcard(),
            test_names: Vec::new(),
            dev_mode_names: Vec::new(),
        }
    }
}

fn wildcard() -> Vec<String> {
    vec![WILDCARD.to_string()]
}

/// `name` is selected by `list` (wildcard or explicit entry).
pub fn list_includes(list: &[String], name: &str) -> bool {
    list.first().is_some_and(|first| first == WILDCARD) || list.iter().any(|n| n == name)
}

/// Add `name` to `list`. A wildcard list already contains everything.
pub fn add_to_list(name: &str, list: &[String]) -> Vec<String> {
    if list_includes(list, name) {
        return list.to_vec();
    }
    let mut out = list.to_vec();
    out.push(name.to_string());
    out
}

/// Remove `name` from `list`. A wildcard list is expanded to `all` first.
pub fn remove_from_list(name: &str, list: &[String], all: &[String]) -> Vec<String> {
    let source = if list.first().is_some_and(|first| first == WILDCARD) {
        all
    } else {
        list
    };
    source.iter().filter(|n| *n != name).cloned().collect()
}

impl TaskSettings {
    pub fn with_deploy_names(mut self, names: Vec<String>) -> Self {
        if !names.is_empty() {
            self.deploy_names = names;
        }
        self
    }

    pub fn with_test_names(mut self, names: Vec<String>) -> Self {
        self.test_names = names;
        self
    }

    pub fn skip_tests(mut self) -> Self {
        self.test_modules.clear();
        self
    }

    pub fn builds_module(&self, module: &str) -> bool {
        list_includes(&self.build_modules, module)
    }

    pub fn deploys(&self, name: &str) -> bool {
        list_includes(&self.deploy_names, name)
    }

    pub fn tests_module(&self, module: &str) -> bool {
        list_includes(&self.test_modules, module)
    }

    /// Dev mode only applies to deploys that are in scope.
    pub fn dev_mode(&self, name: &str) -> bool {
        self.deploys(name) && self.dev_mode_names.iter().any(|n| n == name)
    }

    /// Compiled test-name filter, `None` when every test is selected.
    pub fn test_filter(&self) -> Result<Option<TestFilter>> {
        TestFilter::new(&self.test_names)
    }
}

#[derive(Debug, Clone)]
pub struct TestFilter {
    set: GlobSet,
}

impl TestFilter {
    pub fn new(patterns: &[String]) -> Result<Option<Self>> {
        if patterns.is_empty() {
            return Ok(None);
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern)
                .with_context(|| format!("invalid test name pattern '{pattern}'"))?;
            builder.add(glob);
        }
        let set = builder.build().context("building test name filter")?;
        Ok(Some(Self { set }))
    }

    pub fn matches(&self, name: &str) -> bool {
        self.set.is_match(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn wildcard_selects_everything() {
        let s = TaskSettings::default();
        assert!(s.deploys("api"));
        assert!(s.builds_module("anything"));
        assert!(!s.dev_mode("api"));
    }

    #[test]
    fn add_is_noop_on_wildcard_and_dedupes() {
        assert_eq!(add_to_list("a", &names(&["*"])), names(&["*"]));
        assert_eq!(add_to_list("a", &names(&["a"])), names(&["a"]));
        assert_eq!(add_to_list("b", &names(&["a"])), names(&["a", "b"]));
    }

    #[test]
    fn remove_expands_wildcard() {
        let all = names(&["a", "b", "c"]);
        assert_eq!(remove_from_list("b", &names(&["*"]), &all), names(&["a", "c"]));
        assert_eq!(remove_from_list("a", &names(&["a"]), &all), Vec::<String>::new());
    }

    #[test]
    fn dev_mode_requires_deploy_in_scope() {
        let s = TaskSettings {
            deploy_names: names(&["api"]),
            dev_mode_names: names(&["api", "web"]),
            ..TaskSettings::default()
        };
        assert!(s.dev_mode("api"));
        assert!(!s.dev_mode("web"));
    }

    #[test]
    fn test_filter_uses_globs() {
        let s = TaskSettings::default().with_test_names(names(&["unit-*"]));
        let filter = s.test_filter().unwrap().unwrap();
        assert!(filter.matches("unit-api"));
        assert!(!filter.matches("e2e"));
        assert!(TaskSettings::default().test_filter().unwrap().is_none());
    }

    #[test]
    fn skip_tests_clears_test_modules() {
        assert!(!TaskSettings::default().skip_tests().tests_module("api"));
    }
}
