// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use tracing::debug;

use crate::config::graph::{ConfigGraph, ConfigSource, StaticConfigGraph};
use crate::config::model::{ProjectConfig, RawProjectConfig};
use crate::errors::{DevgraphError, Result};
use crate::router::BoxFuture;

/// File name looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "Devgraph.toml";

/// Load a configuration file from a given path and return the raw `RawProjectConfig`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawProjectConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawProjectConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// Checks for unknown and self references, dependency cycles (declared and
/// through output templates) and basic `[project]` sanity.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ProjectConfig> {
    let raw_config = load_from_path(&path)?;
    let config = ProjectConfig::try_from(raw_config)?;
    Ok(config)
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

/// Project root for a config path.
///
/// A bare file name (parent = "") means the current working directory.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// [`ConfigSource`] that re-reads a project file from disk on every load.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
    root: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let root = config_root_dir(&path);
        Self { path, root }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Synchronous load; hashes every action's sources.
    pub fn load_graph(&self) -> Result<StaticConfigGraph> {
        debug!(path = %self.path.display(), "loading project config");
        let cfg = load_and_validate(&self.path)?;
        StaticConfigGraph::from_config(&cfg, Some(&self.root))
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> BoxFuture<'_, Result<Arc<dyn ConfigGraph>>> {
        let source = self.clone();
        Box::pin(async move {
            let graph = tokio::task::spawn_blocking(move || source.load_graph())
                .await
                .map_err(|e| DevgraphError::Other(anyhow!("config loader panicked: {e}")))??;
            Ok(Arc::new(graph) as Arc<dyn ConfigGraph>)
        })
    }
}
