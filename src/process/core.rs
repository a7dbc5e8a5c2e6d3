// src/process/core.rs

//! Pure state machine of a dev session.
//!
//! The orchestrator shell (`process::process_actions`) feeds it one
//! [`WatchInput`] at a time and executes the returned [`WatchCommand`]s. No
//! channels, graphs or IO live here, so a scripted sequence of inputs fully
//! determines what gets submitted.

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::events::Event;
use crate::process::requests::{Request, SettingsUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Initializing,
    /// Initial batch submitted, waiting for it to drain.
    Processing,
    Watching,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchInput {
    Start,
    /// The initial batch settled.
    InitialComplete,
    Event(Event),
    /// A trial reload after a config edit produced a valid graph.
    ReloadSucceeded,
    /// A trial reload failed with a configuration error.
    ReloadRejected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchCommand {
    SubmitInitial,
    AnnounceWaiting,
    /// Reload the graph and submit the change tasks of these modules.
    PlanChanged { modules: Vec<String> },
    TrialReload { path: Option<PathBuf> },
    HandleRequest(Request),
    UpdateSettings(SettingsUpdate),
    Exit { restart_required: bool },
}

#[derive(Debug, Clone)]
pub struct WatchCore {
    state: WatchState,
    watch: bool,
    watched: BTreeSet<String>,
}

impl WatchCore {
    pub fn new(watch: bool) -> Self {
        Self {
            state: WatchState::Initializing,
            watch,
            watched: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn watched(&self) -> &BTreeSet<String> {
        &self.watched
    }

    /// Modules whose source changes are acted upon.
    pub fn set_watched(&mut self, modules: BTreeSet<String>) {
        self.watched = modules;
    }

    pub fn step(&mut self, input: WatchInput) -> Vec<WatchCommand> {
        if self.state == WatchState::Done {
            debug!(?input, "session finished; ignoring input");
            return Vec::new();
        }

        match input {
            WatchInput::Start => {
                if self.state != WatchState::Initializing {
                    warn!("session already started");
                    return Vec::new();
                }
                self.state = WatchState::Processing;
                vec![WatchCommand::SubmitInitial]
            }
            WatchInput::InitialComplete => {
                if !self.watch {
                    return self.exit(false);
                }
                self.state = WatchState::Watching;
                vec![WatchCommand::AnnounceWaiting]
            }
            WatchInput::ReloadSucceeded => {
                info!("configuration changed, reloading");
                self.exit(true)
            }
            WatchInput::ReloadRejected => Vec::new(),
            WatchInput::Event(event) => self.on_event(event),
        }
    }

    fn exit(&mut self, restart_required: bool) -> Vec<WatchCommand> {
        self.state = WatchState::Done;
        vec![WatchCommand::Exit { restart_required }]
    }

    fn on_event(&mut self, event: Event) -> Vec<WatchCommand> {
        if !self.watch {
            return Vec::new();
        }

        match event {
            Event::TaskGraphComplete if self.state == WatchState::Watching => {
                vec![WatchCommand::AnnounceWaiting]
            }
            Event::Restart => {
                debug!("manual restart triggered");
                self.exit(true)
            }
            Event::Exit => {
                debug!("manual exit triggered");
                self.exit(false)
            }
            Event::ProjectConfigChanged { path }
            | Event::ConfigAdded { path }
            | Event::ConfigRemoved { path }
            | Event::ModuleConfigChanged { path, .. } => {
                vec![WatchCommand::TrialReload { path: Some(path) }]
            }
            Event::ModuleSourcesChanged { names } => {
                let modules: Vec<String> = names
                    .into_iter()
                    .filter(|n| self.watched.contains(n))
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                if modules.is_empty() {
                    debug!("changed modules are not watched; ignoring");
                    return Vec::new();
                }
                vec![WatchCommand::PlanChanged { modules }]
            }
            other => {
                if let Some(request) = Request::from_event(&other) {
                    return vec![WatchCommand::HandleRequest(request)];
                }
                if let Some(update) = SettingsUpdate::from_event(&other) {
                    return vec![WatchCommand::UpdateSettings(update)];
                }
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watching() -> WatchCore {
        let mut core = WatchCore::new(true);
        core.set_watched(["api".to_string(), "lib".to_string()].into_iter().collect());
        assert_eq!(core.step(WatchInput::Start), vec![WatchCommand::SubmitInitial]);
        assert_eq!(
            core.step(WatchInput::InitialComplete),
            vec![WatchCommand::AnnounceWaiting]
        );
        core
    }

    #[test]
    fn without_watch_exits_after_initial_batch() {
        let mut core = WatchCore::new(false);
        core.step(WatchInput::Start);
        assert_eq!(core.state(), WatchState::Processing);
        assert_eq!(
            core.step(WatchInput::InitialComplete),
            vec![WatchCommand::Exit {
                restart_required: false
            }]
        );
        assert_eq!(core.state(), WatchState::Done);
    }

    #[test]
    fn source_changes_filtered_to_watched_modules() {
        let mut core = watching();
        let cmds = core.step(WatchInput::Event(Event::ModuleSourcesChanged {
            names: vec!["web".into(), "api".into(), "api".into()],
        }));
        assert_eq!(
            cmds,
            vec![WatchCommand::PlanChanged {
                modules: vec!["api".into()]
            }]
        );
        assert!(
            core.step(WatchInput::Event(Event::ModuleSourcesChanged {
                names: vec!["web".into()]
            }))
            .is_empty()
        );
    }

    #[test]
    fn config_change_restarts_only_when_reload_succeeds() {
        let mut core = watching();
        let cmds = core.step(WatchInput::Event(Event::ProjectConfigChanged {
            path: "Devgraph.toml".into(),
        }));
        assert!(matches!(cmds[0], WatchCommand::TrialReload { .. }));

        assert!(core.step(WatchInput::ReloadRejected).is_empty());
        assert_eq!(core.state(), WatchState::Watching);

        assert_eq!(
            core.step(WatchInput::ReloadSucceeded),
            vec![WatchCommand::Exit {
                restart_required: true
            }]
        );
    }

    #[test]
    fn exit_and_restart_signals() {
        let mut core = watching();
        assert_eq!(
            core.step(WatchInput::Event(Event::Exit)),
            vec![WatchCommand::Exit {
                restart_required: false
            }]
        );
        assert!(core.step(WatchInput::Event(Event::Restart)).is_empty());

        let mut core = watching();
        assert_eq!(
            core.step(WatchInput::Event(Event::Restart)),
            vec![WatchCommand::Exit {
                restart_required: true
            }]
        );
    }

    #[test]
    fn graph_complete_announces_waiting_only_while_watching() {
        let mut core = WatchCore::new(true);
        core.step(WatchInput::Start);
        assert!(core.step(WatchInput::Event(Event::TaskGraphComplete)).is_empty());
        core.step(WatchInput::InitialComplete);
        assert_eq!(
            core.step(WatchInput::Event(Event::TaskGraphComplete)),
            vec![WatchCommand::AnnounceWaiting]
        );
    }

    #[test]
    fn remote_requests_become_commands() {
        let mut core = watching();
        let cmds = core.step(WatchInput::Event(Event::BuildRequested {
            module: "api".into(),
            force: true,
        }));
        assert_eq!(
            cmds,
            vec![WatchCommand::HandleRequest(Request::Build {
                module: "api".into(),
                force: true
            })]
        );
        let cmds = core.step(WatchInput::Event(Event::UpdateTestOnWatch { modules: vec![] }));
        assert_eq!(
            cmds,
            vec![WatchCommand::UpdateSettings(SettingsUpdate::TestModules(vec![]))]
        );
    }

    #[test]
    fn events_ignored_without_watch() {
        let mut core = WatchCore::new(false);
        core.step(WatchInput::Start);
        assert!(core.step(WatchInput::Event(Event::Restart)).is_empty());
    }
}
