// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::detect::RecognizerSpec;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [orchestrator]
/// queue_capacity = 256
/// launch_settle_secs = 10
/// terminate_grace_secs = 5
/// # job_deadline_secs = 600
///
/// [store]
/// path = ".appdock/state.json"
///
/// [[recognizer]]
/// name = "my-framework"
/// pattern = 'serving UI at (https?://\S+)'
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    /// Worker/queue behaviour from `[orchestrator]`.
    #[serde(default)]
    pub orchestrator: OrchestratorSection,

    /// Durable state location from `[store]`.
    #[serde(default)]
    pub store: StoreSection,

    /// Extra endpoint recognizers from `[[recognizer]]` entries.
    ///
    /// These are evaluated *after* the built-in table; adding support for a
    /// new service type is purely a data addition here.
    #[serde(default)]
    pub recognizer: Vec<RecognizerSpec>,
}

/// `[orchestrator]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    /// Capacity of the bounded job queue. `enqueue` never blocks; it fails
    /// fast once this many events are pending.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How long a launched service may start up before it is considered
    /// running even without a recognized endpoint line.
    #[serde(default = "default_launch_settle_secs")]
    pub launch_settle_secs: u64,

    /// Grace period between the polite stop signal and the forced kill.
    #[serde(default = "default_terminate_grace_secs")]
    pub terminate_grace_secs: u64,

    /// Optional hard deadline per job. Absent by default: a hung external
    /// process then hangs the worker until an explicit stop.
    #[serde(default)]
    pub job_deadline_secs: Option<u64>,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            launch_settle_secs: default_launch_settle_secs(),
            terminate_grace_secs: default_terminate_grace_secs(),
            job_deadline_secs: None,
        }
    }
}

fn default_queue_capacity() -> usize {
    256
}

fn default_launch_settle_secs() -> u64 {
    10
}

fn default_terminate_grace_secs() -> u64 {
    5
}

/// `[store]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// Path of the JSON state file, relative to the working directory
    /// unless absolute.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".appdock/state.json")
}

/// Validated configuration.
///
/// Constructed via `TryFrom<RawConfigFile>` (see `validate.rs`), which is
/// the only way to obtain one outside this module.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub orchestrator: OrchestratorSection,
    pub store: StoreSection,
    pub recognizer: Vec<RecognizerSpec>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            orchestrator: raw.orchestrator,
            store: raw.store,
            recognizer: raw.recognizer,
        }
    }

    pub fn launch_settle(&self) -> Duration {
        Duration::from_secs(self.orchestrator.launch_settle_secs)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_secs(self.orchestrator.terminate_grace_secs)
    }

    pub fn job_deadline(&self) -> Option<Duration> {
        self.orchestrator.job_deadline_secs.map(Duration::from_secs)
    }
}
