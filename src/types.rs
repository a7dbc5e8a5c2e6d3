// src/types.rs

//! Small value types shared by the config, task and router layers.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// The kind of a config-declared action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Build,
    Deploy,
    Run,
    Test,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        ActionKind::Build,
        ActionKind::Deploy,
        ActionKind::Run,
        ActionKind::Test,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Build => "build",
            ActionKind::Deploy => "deploy",
            ActionKind::Run => "run",
            ActionKind::Test => "test",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "build" => Ok(ActionKind::Build),
            "deploy" => Ok(ActionKind::Deploy),
            "run" => Ok(ActionKind::Run),
            "test" => Ok(ActionKind::Test),
            other => Err(format!(
                "invalid action kind: {other} (expected build, deploy, run or test)"
            )),
        }
    }
}

/// Reference to an action by kind and name, written `"<kind>.<name>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "String")]
pub struct ActionRef {
    pub kind: ActionKind,
    pub name: String,
}

impl ActionRef {
    pub fn new(kind: ActionKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn build(name: impl Into<String>) -> Self {
        Self::new(ActionKind::Build, name)
    }

    pub fn deploy(name: impl Into<String>) -> Self {
        Self::new(ActionKind::Deploy, name)
    }

    pub fn run(name: impl Into<String>) -> Self {
        Self::new(ActionKind::Run, name)
    }

    pub fn test(name: impl Into<String>) -> Self {
        Self::new(ActionKind::Test, name)
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

impl FromStr for ActionRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s
            .split_once('.')
            .ok_or_else(|| format!("invalid action reference '{s}' (expected \"<kind>.<name>\")"))?;
        if name.is_empty() {
            return Err(format!("invalid action reference '{s}': empty action name"));
        }
        Ok(ActionRef::new(kind.parse()?, name))
    }
}

impl TryFrom<String> for ActionRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Status reported by a router's status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionStatus {
    /// Up to date at the requested version; execution may be skipped.
    Ready,
    /// Known to be out of date.
    Outdated,
    /// The router can't tell.
    #[default]
    Unknown,
}
