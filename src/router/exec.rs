// src/router/exec.rs

//! Router for `type = "exec"` actions: run a shell command per action.
//!
//! Spec keys:
//! - `command`: run through `sh -c` (`cmd /C` on Windows) in the project root.
//! - `env`: table of extra environment variables.
//! - `status_command`: optional; exit code 0 means the action is up to date.
//!
//! Every stdout line of the form `::set-output <key>=<value>` becomes an
//! output; the remaining trimmed stdout is the `log` output.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::TaskError;
use crate::router::status::{StoredBuild, VersionStore};
use crate::router::{ActionResult, ActionRouter, BoxFuture, ResolvedAction, StatusReport};
use crate::types::{ActionKind, ActionStatus};

pub const EXEC_ACTION_TYPE: &str = "exec";

const SET_OUTPUT_PREFIX: &str = "::set-output ";
const STDERR_TAIL_LINES: usize = 10;

pub struct ExecRouter {
    root: PathBuf,
    versions: Option<Mutex<Box<dyn VersionStore>>>,
}

impl ExecRouter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            versions: None,
        }
    }

    /// Remember successful Builds; a Build whose stored version matches its
    /// current one reports `Ready` with the stored outputs.
    pub fn with_version_store(mut self, store: Box<dyn VersionStore>) -> Self {
        self.versions = Some(Mutex::new(store));
        self
    }

    fn stored_build(&self, action: &str) -> Option<StoredBuild> {
        let store = self.versions.as_ref()?.lock().ok()?;
        match store.load(action) {
            Ok(v) => v,
            Err(err) => {
                warn!(action = %action, error = %err, "failed to read stored build");
                None
            }
        }
    }

    fn store_build(&self, action: &str, build: StoredBuild) {
        let Some(versions) = &self.versions else {
            return;
        };
        match versions.lock() {
            Ok(mut store) => {
                if let Err(err) = store.save(action, build) {
                    warn!(action = %action, error = %err, "failed to store version");
                }
            }
            Err(_) => warn!(action = %action, "version store lock poisoned"),
        }
    }

    async fn run_command(
        &self,
        action: &ResolvedAction,
        command: &str,
    ) -> Result<CommandOutput, TaskError> {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command);
            c
        };

        cmd.current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(env) = action.spec.get("env").and_then(|v| v.as_table()) {
            for (key, value) in env {
                let value = match value.as_str() {
                    Some(s) => s.to_string(),
                    None => value.to_string(),
                };
                cmd.env(key, value);
            }
        }
        if action.dev_mode {
            cmd.env("DEVGRAPH_DEV_MODE", "1");
        }

        let output = cmd.output().await.map_err(|e| {
            TaskError::Execution(format!(
                "spawning command for {}: {e}",
                action.action.describe()
            ))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        for line in stderr.lines() {
            debug!(action = %action.action.describe(), "stderr: {}", line);
        }

        Ok(CommandOutput {
            code: output.status.code(),
            success: output.status.success(),
            stdout,
            stderr,
        })
    }
}

struct CommandOutput {
    code: Option<i32>,
    success: bool,
    stdout: String,
    stderr: String,
}

/// Split stdout into `::set-output` values and the remaining log.
pub fn parse_outputs(stdout: &str) -> BTreeMap<String, String> {
    let mut outputs = BTreeMap::new();
    let mut log_lines = Vec::new();

    for line in stdout.lines() {
        match line.trim_start().strip_prefix(SET_OUTPUT_PREFIX) {
            Some(rest) => match rest.split_once('=') {
                Some((key, value)) => {
                    outputs.insert(key.trim().to_string(), value.to_string());
                }
                None => log_lines.push(line),
            },
            None => log_lines.push(line),
        }
    }

    outputs.insert("log".to_string(), log_lines.join("\n").trim().to_string());
    outputs
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

impl ActionRouter for ExecRouter {
    fn execute<'a>(
        &'a self,
        action: &'a ResolvedAction,
    ) -> BoxFuture<'a, Result<ActionResult, TaskError>> {
        Box::pin(async move {
            let name = action.action.describe();
            if action.action.action_type != EXEC_ACTION_TYPE {
                return Err(TaskError::Execution(format!(
                    "no handler for action type '{}' ({name})",
                    action.action.action_type
                )));
            }

            let Some(command) = action.spec_str("command") else {
                debug!(action = %name, "no command configured; nothing to do");
                return Ok(ActionResult::default());
            };

            info!(action = %name, cmd = %command, "running action command");
            let out = self.run_command(action, command).await?;

            if !out.success {
                let code = out.code.unwrap_or(-1);
                warn!(action = %name, exit_code = code, "action command failed");
                return Err(TaskError::Execution(format!(
                    "command exited with code {code}: {}",
                    stderr_tail(&out.stderr)
                )));
            }

            let outputs = parse_outputs(&out.stdout);
            if action.action.kind == ActionKind::Build {
                self.store_build(
                    &name,
                    StoredBuild::new(action.action.version.clone(), outputs.clone()),
                );
            }

            Ok(ActionResult { outputs })
        })
    }

    fn get_status<'a>(
        &'a self,
        action: &'a ResolvedAction,
    ) -> BoxFuture<'a, Result<StatusReport, TaskError>> {
        Box::pin(async move {
            let name = action.action.describe();

            if let Some(status_command) = action.spec_str("status_command") {
                let out = self.run_command(action, status_command).await?;
                let status = if out.success {
                    ActionStatus::Ready
                } else {
                    ActionStatus::Outdated
                };
                debug!(action = %name, ?status, "status command finished");
                return Ok(StatusReport {
                    status,
                    outputs: parse_outputs(&out.stdout),
                });
            }

            if action.action.kind == ActionKind::Build {
                if let Some(stored) = self.stored_build(&name) {
                    // Without outputs a skip would starve dependants.
                    if stored.version != action.action.version || stored.outputs.is_empty() {
                        return Ok(StatusReport {
                            status: ActionStatus::Outdated,
                            outputs: BTreeMap::new(),
                        });
                    }
                    debug!(action = %name, version = %stored.version, "build is up to date");
                    return Ok(StatusReport {
                        status: ActionStatus::Ready,
                        outputs: stored.outputs,
                    });
                }
            }

            Ok(StatusReport::default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_output_lines_become_outputs() {
        let outputs = parse_outputs("building\n::set-output image=api:v1\n::set-output port=80\ndone\n");
        assert_eq!(outputs.get("image").map(String::as_str), Some("api:v1"));
        assert_eq!(outputs.get("port").map(String::as_str), Some("80"));
        assert_eq!(outputs.get("log").map(String::as_str), Some("building\ndone"));
    }

    #[test]
    fn value_may_contain_equals() {
        let outputs = parse_outputs("::set-output url=http://h/?a=b\n");
        assert_eq!(outputs.get("url").map(String::as_str), Some("http://h/?a=b"));
    }

    #[test]
    fn tail_keeps_last_lines() {
        let stderr: String = (0..30).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(&stderr);
        assert!(tail.starts_with("line 20"));
        assert!(tail.ends_with("line 29"));
    }
}
