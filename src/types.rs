// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical application name type used throughout the crate.
pub type AppName = String;

/// User-triggered action against one application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Install,
    Launch,
    Stop,
    Uninstall,
    Certify,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionKind::Install => "install",
            ActionKind::Launch => "launch",
            ActionKind::Stop => "stop",
            ActionKind::Uninstall => "uninstall",
            ActionKind::Certify => "certify",
        };
        f.write_str(s)
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "install" => Ok(ActionKind::Install),
            "launch" => Ok(ActionKind::Launch),
            "stop" => Ok(ActionKind::Stop),
            "uninstall" => Ok(ActionKind::Uninstall),
            "certify" => Ok(ActionKind::Certify),
            other => Err(format!(
                "invalid action: {other} (expected install, launch, stop, uninstall or certify)"
            )),
        }
    }
}

/// Durable lifecycle status of a managed application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppStatus {
    NotInstalled,
    Installing,
    Installed,
    Running,
    Stopped,
    Error,
}

impl Default for AppStatus {
    fn default() -> Self {
        AppStatus::NotInstalled
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppStatus::NotInstalled => "NOT_INSTALLED",
            AppStatus::Installing => "INSTALLING",
            AppStatus::Installed => "INSTALLED",
            AppStatus::Running => "RUNNING",
            AppStatus::Stopped => "STOPPED",
            AppStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Lifecycle status of a process under the execution engine's control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Completed,
    Failed(i32),
    Killed,
}

impl ProcessStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProcessStatus::Running)
    }
}

/// How a watched process finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Process exited on its own with this code.
    Exited(i32),
    /// Process was forcefully killed before exiting.
    Killed,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        matches!(self, ExitOutcome::Exited(0))
    }

    pub fn code(&self) -> i32 {
        match self {
            ExitOutcome::Exited(code) => *code,
            ExitOutcome::Killed => -1,
        }
    }
}

/// Origin channel of one process output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputChannel {
    Stdout,
    Stderr,
}

impl OutputChannel {
    pub fn prefix(&self) -> &'static str {
        match self {
            OutputChannel::Stdout => "stdout",
            OutputChannel::Stderr => "stderr",
        }
    }
}

/// One line of process output, tagged with its origin channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub channel: OutputChannel,
    pub text: String,
}

impl OutputLine {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            channel: OutputChannel::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            channel: OutputChannel::Stderr,
            text: text.into(),
        }
    }
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.channel.prefix(), self.text)
    }
}

/// Transient state of a queued job; logged, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}
