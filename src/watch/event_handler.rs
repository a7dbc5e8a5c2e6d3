// src/watch/event_handler.rs

//! Turns raw filesystem paths into bus events.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::events::Event;
use crate::watch::path_utils::{is_config_path, relative_str};
use crate::watch::patterns::SourceProfile;

/// What happened to a path, as far as we care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

impl From<&notify::EventKind> for ChangeKind {
    fn from(kind: &notify::EventKind) -> Self {
        match kind {
            notify::EventKind::Create(_) => ChangeKind::Created,
            notify::EventKind::Remove(_) => ChangeKind::Removed,
            _ => ChangeKind::Modified,
        }
    }
}

/// Classifies changed paths against the project's config files and the
/// per-action source profiles.
#[derive(Debug, Clone)]
pub struct ChangeClassifier {
    root: PathBuf,
    /// Root-relative; the first entry is the project file.
    config_files: Vec<String>,
    profiles: Vec<SourceProfile>,
}

/// Events produced by one debounced batch of paths.
#[derive(Debug, Default)]
pub struct ChangeBatch {
    modules: BTreeSet<String>,
    config_events: Vec<Event>,
}

impl ChangeBatch {
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.config_events.is_empty()
    }

    /// Config events first, then a single `ModuleSourcesChanged`.
    pub fn into_events(self) -> Vec<Event> {
        let mut events = self.config_events;
        if !self.modules.is_empty() {
            events.push(Event::ModuleSourcesChanged {
                names: self.modules.into_iter().collect(),
            });
        }
        events
    }
}

impl ChangeClassifier {
    pub fn new(root: impl Into<PathBuf>, config_files: Vec<String>, profiles: Vec<SourceProfile>) -> Self {
        Self {
            root: root.into(),
            config_files,
            profiles,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fold one changed path into `batch`.
    pub fn classify(&self, path: &Path, kind: ChangeKind, batch: &mut ChangeBatch) {
        let Some(rel) = relative_str(&self.root, path) else {
            warn!(?path, root = ?self.root, "could not relativize path");
            return;
        };
        if rel.is_empty() {
            return;
        }

        if is_config_path(&rel, &self.config_files) {
            let event = self.config_event(&rel, path, kind);
            debug!(rel = %rel, event = event.name(), "config file changed");
            if !batch.config_events.contains(&event) {
                batch.config_events.push(event);
            }
            return;
        }

        for profile in self.profiles.iter().filter(|p| p.matches(&rel)) {
            if batch.modules.insert(profile.module().to_string()) {
                debug!(rel = %rel, module = %profile.module(), "module sources changed");
            }
        }
    }

    fn config_event(&self, rel: &str, path: &Path, kind: ChangeKind) -> Event {
        let path = path.to_path_buf();
        let is_project_file = self
            .config_files
            .first()
            .is_some_and(|p| is_config_path(rel, std::slice::from_ref(p)));
        if is_project_file {
            return Event::ProjectConfigChanged { path };
        }
        match kind {
            ChangeKind::Created => Event::ConfigAdded { path },
            ChangeKind::Removed => Event::ConfigRemoved { path },
            ChangeKind::Modified => {
                let names: BTreeSet<String> = self
                    .profiles
                    .iter()
                    .filter(|p| p.matches(rel))
                    .map(|p| p.module().to_string())
                    .collect();
                Event::ModuleConfigChanged {
                    names: names.into_iter().collect(),
                    path,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ChangeClassifier {
        let api = SourceProfile::new("api", &["api/**".to_string()], &[]).unwrap();
        let web = SourceProfile::new("web", &["web/**".to_string()], &["web/dist/**".to_string()])
            .unwrap();
        ChangeClassifier::new(
            "/project",
            vec!["Devgraph.toml".into(), "api/devgraph.toml".into()],
            vec![api, web],
        )
    }

    fn classify(paths: &[(&str, ChangeKind)]) -> Vec<Event> {
        let c = classifier();
        let mut batch = ChangeBatch::default();
        for (p, kind) in paths {
            c.classify(Path::new(p), *kind, &mut batch);
        }
        batch.into_events()
    }

    #[test]
    fn source_paths_map_to_modules() {
        let events = classify(&[
            ("/project/web/src/app.ts", ChangeKind::Modified),
            ("/project/api/main.rs", ChangeKind::Modified),
            ("/project/api/lib.rs", ChangeKind::Created),
            ("/project/web/dist/bundle.js", ChangeKind::Modified),
        ]);
        assert_eq!(
            events,
            vec![Event::ModuleSourcesChanged {
                names: vec!["api".into(), "web".into()]
            }]
        );
    }

    #[test]
    fn project_file_maps_to_project_config_changed() {
        let events = classify(&[("/project/Devgraph.toml", ChangeKind::Modified)]);
        assert_eq!(
            events,
            vec![Event::ProjectConfigChanged {
                path: "/project/Devgraph.toml".into()
            }]
        );
    }

    #[test]
    fn extra_config_files_report_kind() {
        let events = classify(&[
            ("/project/api/devgraph.toml", ChangeKind::Created),
            ("/project/api/devgraph.toml", ChangeKind::Created),
        ]);
        assert_eq!(
            events,
            vec![Event::ConfigAdded {
                path: "/project/api/devgraph.toml".into()
            }]
        );

        let events = classify(&[("/project/api/devgraph.toml", ChangeKind::Modified)]);
        assert_eq!(
            events,
            vec![Event::ModuleConfigChanged {
                names: vec!["api".into()],
                path: "/project/api/devgraph.toml".into()
            }]
        );
    }

    #[test]
    fn unmatched_paths_produce_nothing() {
        let c = classifier();
        let mut batch = ChangeBatch::default();
        c.classify(Path::new("/project/README.md"), ChangeKind::Modified, &mut batch);
        c.classify(Path::new("/elsewhere/x"), ChangeKind::Modified, &mut batch);
        assert!(batch.is_empty());
    }
}
