// src/orchestrator/collab.rs

//! Consumed collaborator interfaces.
//!
//! The orchestrator decides nothing about *what* commands to run or how
//! tunnels come to exist; those concerns live behind these traits. Embedders
//! plug in their real resolvers/provisioners, tests plug in fakes (see
//! `crates/test-utils`).

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::errors::Result;
use crate::types::ActionKind;

/// Normalized list of shell commands for one action against one app,
/// produced upstream by installer-script translation.
#[derive(Debug, Clone, Default)]
pub struct Recipe {
    /// Shell command strings, run strictly in order. For a launch recipe
    /// the final step is the long-lived service itself.
    pub steps: Vec<String>,
    /// Working directory shared by every step.
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables shared by every step.
    pub env: Vec<(String, String)>,
    /// Where the application lands on disk, recorded on install success.
    pub install_path: Option<String>,
    /// Isolated runtime environment the steps should execute inside.
    pub environment_id: Option<String>,
}

/// Resolves an (application, action) pair into a [`Recipe`].
pub trait RecipeResolver: Send + Sync {
    fn resolve(&self, app: &str, action: ActionKind) -> Result<Recipe>;
}

/// Supplies the command prefix that places a step inside an isolated
/// runtime environment. Environment *creation* is outside this core.
pub trait EnvironmentProvisioner: Send + Sync {
    /// Prefix prepended to a step command (e.g. an activation wrapper).
    /// An empty prefix means "run as-is".
    fn command_prefix(&self, environment_id: &str) -> Result<String>;
}

/// Maps a detected local endpoint to a public URL.
///
/// Invoked synchronously from within job execution; a failure here fails
/// the job. The boxed-future signature keeps the trait object-safe.
pub trait TunnelProvisioner: Send + Sync {
    fn provision(
        &self,
        local_endpoint: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;
}
