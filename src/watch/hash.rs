// src/watch/hash.rs

//! Content hashing of module sources, used to version actions.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::debug;

use crate::watch::patterns::{SourceProfile, collect_matching_files};

/// Compute the hash of a single file.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file =
        File::open(path).with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Compute a deterministic hash over the contents of the given files.
///
/// Paths are sorted first so iteration order doesn't matter. Relative paths
/// (to `root`) are mixed in so renames change the hash.
pub fn compute_hash_for_paths<I, P>(root: &Path, paths: I) -> Result<String>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut hasher = Hasher::new();

    let mut paths_vec: Vec<PathBuf> = paths
        .into_iter()
        .map(|p| p.as_ref().to_path_buf())
        .collect();
    paths_vec.sort();

    for path in paths_vec {
        if path.is_file() {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            hasher.update(rel.to_string_lossy().as_bytes());
            hasher.update(compute_file_hash(&path)?.as_bytes());
        }
    }

    let hash = hasher.finalize().to_hex().to_string();
    debug!(hash = %hash, "computed aggregate hash");
    Ok(hash)
}

/// Aggregate content hash of every file under `root` matched by `profile`.
pub fn compute_source_hash(root: &Path, profile: &SourceProfile) -> Result<String> {
    let files = collect_matching_files(root, profile)?;
    debug!(module = %profile.module(), files = files.len(), "hashing module sources");
    compute_hash_for_paths(root, files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn hash_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "one").unwrap();
        let profile = SourceProfile::new("m", &[], &[]).unwrap();

        let first = compute_source_hash(dir.path(), &profile).unwrap();
        let again = compute_source_hash(dir.path(), &profile).unwrap();
        assert_eq!(first, again);

        fs::write(dir.path().join("a.txt"), "two").unwrap();
        let changed = compute_source_hash(dir.path(), &profile).unwrap();
        assert_ne!(first, changed);
    }

    #[test]
    fn hash_ignores_unmatched_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "one").unwrap();
        let profile = SourceProfile::new("m", &["*.rs".to_string()], &[]).unwrap();

        let before = compute_source_hash(dir.path(), &profile).unwrap();
        fs::write(dir.path().join("notes.md"), "irrelevant").unwrap();
        let after = compute_source_hash(dir.path(), &profile).unwrap();
        assert_eq!(before, after);
    }
}
