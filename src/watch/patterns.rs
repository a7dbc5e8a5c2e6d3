// src/watch/patterns.rs

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::Action;

/// Include pattern used when neither the action nor `[defaults]` set one.
pub const DEFAULT_INCLUDE: &str = "**/*";

/// Paths that never count as sources: our own state dir and VCS metadata.
pub const ALWAYS_EXCLUDED: [&str; 2] = [".devgraph/**", ".git/**"];

/// Compiled include/exclude globs describing which files belong to a module.
///
/// Patterns are relative to the project root; callers pass relative,
/// forward-slash paths (see [`crate::watch::path_utils::relative_str`]).
#[derive(Clone)]
pub struct SourceProfile {
    module: String,
    include_set: GlobSet,
    exclude_set: GlobSet,
}

impl fmt::Debug for SourceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceProfile")
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

impl SourceProfile {
    pub fn new(module: impl Into<String>, include: &[String], exclude: &[String]) -> Result<Self> {
        let module = module.into();

        let include_patterns: Vec<String> = if include.is_empty() {
            vec![DEFAULT_INCLUDE.to_string()]
        } else {
            include.to_vec()
        };
        let mut exclude_patterns: Vec<String> = exclude.to_vec();
        exclude_patterns.extend(ALWAYS_EXCLUDED.iter().map(|s| s.to_string()));

        let include_set = build_globset(&include_patterns)
            .with_context(|| format!("building include globset for module {module}"))?;
        let exclude_set = build_globset(&exclude_patterns)
            .with_context(|| format!("building exclude globset for module {module}"))?;

        Ok(Self {
            module,
            include_set,
            exclude_set,
        })
    }

    /// Profile for the sources of a single action.
    pub fn for_action(action: &Action) -> Result<Self> {
        Self::new(action.module.clone(), &action.include, &action.exclude)
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Whether a root-relative path such as `"api/src/main.rs"` belongs here.
    pub fn matches(&self, rel_path: &str) -> bool {
        self.include_set.is_match(rel_path) && !self.exclude_set.is_match(rel_path)
    }
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Root-level directories under [`ALWAYS_EXCLUDED`]; never descended into.
fn is_pruned_dir(rel: &str) -> bool {
    ALWAYS_EXCLUDED
        .iter()
        .any(|pattern| pattern.strip_suffix("/**") == Some(rel))
}

/// Collect all files under `root` matched by `profile`, sorted.
///
/// Symlinked directories are not followed; symlinked files are.
pub fn collect_matching_files(root: &Path, profile: &SourceProfile) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries =
            fs::read_dir(&dir).with_context(|| format!("reading directory {}", dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let Ok(rel) = path.strip_prefix(root) else {
                continue;
            };
            let rel_str = rel.to_string_lossy().replace('\\', "/");

            if entry.file_type()?.is_dir() {
                if !is_pruned_dir(&rel_str) {
                    stack.push(path);
                }
            } else if path.is_file() && profile.matches(&rel_str) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_include_matches_everything_but_state_dirs() {
        let profile = SourceProfile::new("api", &[], &[]).unwrap();
        assert!(profile.matches("src/main.rs"));
        assert!(profile.matches("Dockerfile"));
        assert!(!profile.matches(".devgraph/versions.toml"));
        assert!(!profile.matches(".git/HEAD"));
    }

    #[test]
    fn include_and_exclude_are_combined() {
        let profile = SourceProfile::new(
            "api",
            &["api/**".to_string()],
            &["api/**/*.tmp".to_string()],
        )
        .unwrap();
        assert!(profile.matches("api/src/lib.rs"));
        assert!(!profile.matches("api/src/lib.tmp"));
        assert!(!profile.matches("web/index.html"));
    }

    #[test]
    fn invalid_glob_is_reported() {
        let err = SourceProfile::new("api", &["a/[".to_string()], &[]).unwrap_err();
        assert!(format!("{err:#}").contains("invalid glob pattern"));
    }

    #[test]
    fn collects_only_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("api/src")).unwrap();
        fs::create_dir_all(dir.path().join("web")).unwrap();
        fs::write(dir.path().join("api/src/lib.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("web/index.html"), "<html>").unwrap();

        let profile = SourceProfile::new("api", &["api/**".to_string()], &[]).unwrap();
        let files = collect_matching_files(dir.path(), &profile).unwrap();
        assert_eq!(files, vec![dir.path().join("api/src/lib.rs")]);
    }

    #[test]
    fn state_dirs_are_not_walked() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        fs::write(dir.path().join(".git/objects/ab"), "blob").unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();

        let profile = SourceProfile::new("app", &[], &[]).unwrap();
        let files = collect_matching_files(dir.path(), &profile).unwrap();
        assert_eq!(files, vec![dir.path().join("main.rs")]);
        assert!(is_pruned_dir(".devgraph"));
        assert!(!is_pruned_dir("api/.git"));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("api")).unwrap();
        fs::write(dir.path().join("api/lib.rs"), "").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("api/loop")).unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("api/lib.rs"),
            dir.path().join("api/alias.rs"),
        )
        .unwrap();

        let profile = SourceProfile::new("api", &["api/**".to_string()], &[]).unwrap();
        let files = collect_matching_files(dir.path(), &profile).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("api/alias.rs"), dir.path().join("api/lib.rs")]
        );
    }
}
