// src/router/status.rs

//! Storage for the last successful Build of each action: its version and
//! the outputs it produced.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Relative path (from the project root) to the versions file.
pub const VERSION_FILE_PATH: &str = ".devgraph/versions.toml";

fn version_file_path(root: &Path) -> PathBuf {
    root.join(VERSION_FILE_PATH)
}

/// What a successful Build left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBuild {
    pub version: String,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

impl StoredBuild {
    pub fn new(version: impl Into<String>, outputs: BTreeMap<String, String>) -> Self {
        Self {
            version: version.into(),
            outputs,
        }
    }
}

/// Abstract storage for Build records, keyed by `"<kind>.<name>"`.
pub trait VersionStore: Send + Sync {
    fn load(&self, action: &str) -> Result<Option<StoredBuild>>;
    fn save(&mut self, action: &str, build: StoredBuild) -> Result<()>;
    /// Remove records for actions that are not in `active_actions`.
    fn prune(&mut self, active_actions: &[&str]) -> Result<()>;
}

/// Stores records as TOML in `<root>/.devgraph/versions.toml`.
pub struct FileVersionStore {
    root: PathBuf,
}

impl FileVersionStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl VersionStore for FileVersionStore {
    fn load(&self, action: &str) -> Result<Option<StoredBuild>> {
        let map = load_all_builds(&self.root)?;
        Ok(map.get(action).cloned())
    }

    fn save(&mut self, action: &str, build: StoredBuild) -> Result<()> {
        let mut map = load_all_builds(&self.root)?;
        info!(action = %action, version = %build.version, "stored build (file)");
        map.insert(action.to_string(), build);
        save_all_builds(&self.root, &map)
    }

    fn prune(&mut self, active_actions: &[&str]) -> Result<()> {
        let mut map = load_all_builds(&self.root)?;
        let initial_len = map.len();
        map.retain(|k, _| active_actions.contains(&k.as_str()));

        if map.len() < initial_len {
            save_all_builds(&self.root, &map)?;
            info!(
                removed = initial_len - map.len(),
                "pruned stale build records (file)"
            );
        }
        Ok(())
    }
}

/// Stores records in memory only.
#[derive(Default)]
pub struct MemoryVersionStore {
    map: HashMap<String, StoredBuild>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VersionStore for MemoryVersionStore {
    fn load(&self, action: &str) -> Result<Option<StoredBuild>> {
        Ok(self.map.get(action).cloned())
    }

    fn save(&mut self, action: &str, build: StoredBuild) -> Result<()> {
        debug!(action = %action, version = %build.version, "stored build (memory)");
        self.map.insert(action.to_string(), build);
        Ok(())
    }

    fn prune(&mut self, active_actions: &[&str]) -> Result<()> {
        self.map.retain(|k, _| active_actions.contains(&k.as_str()));
        Ok(())
    }
}

fn load_all_builds(root: &Path) -> Result<BTreeMap<String, StoredBuild>> {
    let path = version_file_path(root);

    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let text =
        fs::read_to_string(&path).with_context(|| format!("reading version file at {:?}", path))?;
    toml::from_str(&text).with_context(|| format!("parsing version file at {:?}", path))
}

fn save_all_builds(root: &Path, map: &BTreeMap<String, StoredBuild>) -> Result<()> {
    let path = version_file_path(root);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating version directory at {:?}", parent))?;
    }

    let text = toml::to_string(map).context("serializing build records")?;
    fs::write(&path, text).with_context(|| format!("writing version file at {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(version: &str, image: &str) -> StoredBuild {
        StoredBuild::new(version, BTreeMap::from([("image".to_string(), image.to_string())]))
    }

    #[test]
    fn file_store_round_trips_and_prunes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileVersionStore::new(dir.path().to_path_buf());

        assert_eq!(store.load("build.api").unwrap(), None);
        store.save("build.api", build("v-1", "api:1")).unwrap();
        store.save("build.web", build("v-2", "web:2")).unwrap();
        assert_eq!(store.load("build.api").unwrap(), Some(build("v-1", "api:1")));

        store.prune(&["build.web"]).unwrap();
        assert_eq!(store.load("build.api").unwrap(), None);

        let reopened = FileVersionStore::new(dir.path().to_path_buf());
        assert_eq!(reopened.load("build.web").unwrap(), Some(build("v-2", "web:2")));
    }

    #[test]
    fn records_without_outputs_still_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = version_file_path(dir.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "[\"build.api\"]\nversion = \"v-1\"\n").unwrap();

        let store = FileVersionStore::new(dir.path().to_path_buf());
        let loaded = store.load("build.api").unwrap().unwrap();
        assert_eq!(loaded.version, "v-1");
        assert!(loaded.outputs.is_empty());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = version_file_path(dir.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "build.api v-1\n").unwrap();

        let store = FileVersionStore::new(dir.path().to_path_buf());
        assert!(store.load("build.api").is_err());
    }

    #[test]
    fn memory_store_overwrites() {
        let mut store = MemoryVersionStore::new();
        store.save("build.api", build("v-1", "api:1")).unwrap();
        store.save("build.api", build("v-2", "api:2")).unwrap();
        assert_eq!(store.load("build.api").unwrap(), Some(build("v-2", "api:2")));
    }
}
