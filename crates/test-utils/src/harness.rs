//! Orchestrator harness for integration tests.
//!
//! Wires a real engine, a temp-dir state store and fake collaborators into
//! a running orchestrator, so tests only describe recipes and assertions.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use appdock::detect::LogDetector;
use appdock::exec::ProcessEngine;
use appdock::orchestrator::{
    Collaborators, Orchestrator, OrchestratorHandle, OrchestratorOptions, TunnelProvisioner,
};
use appdock::store::StateStore;

use crate::fakes::{FixedPrefixEnvironments, RecipeBook, StaticTunnel};

pub struct Harness {
    pub handle: OrchestratorHandle,
    pub join: JoinHandle<()>,
    pub store: Arc<StateStore>,
    pub engine: Arc<ProcessEngine>,
    // Keeps the state file alive for the duration of the test.
    _tmp: TempDir,
}

pub struct HarnessBuilder {
    recipes: RecipeBook,
    tunnel: Arc<dyn TunnelProvisioner>,
    environments: FixedPrefixEnvironments,
    options: OrchestratorOptions,
    terminate_grace: Duration,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            recipes: RecipeBook::new(),
            tunnel: Arc::new(StaticTunnel::new("https://test.tunnel.example")),
            environments: FixedPrefixEnvironments::none(),
            options: OrchestratorOptions {
                // Keep launch tests snappy: a service that never prints an
                // endpoint still settles quickly.
                launch_settle: Duration::from_millis(500),
                ..OrchestratorOptions::default()
            },
            terminate_grace: Duration::from_secs(2),
        }
    }

    pub fn recipes(mut self, recipes: RecipeBook) -> Self {
        self.recipes = recipes;
        self
    }

    pub fn tunnel(mut self, tunnel: Arc<dyn TunnelProvisioner>) -> Self {
        self.tunnel = tunnel;
        self
    }

    pub fn environments(mut self, environments: FixedPrefixEnvironments) -> Self {
        self.environments = environments;
        self
    }

    pub fn options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn launch_settle(mut self, settle: Duration) -> Self {
        self.options.launch_settle = settle;
        self
    }

    pub fn spawn(self) -> anyhow::Result<Harness> {
        let tmp = TempDir::new()?;
        let store = Arc::new(StateStore::open(tmp.path().join("state.json"))?);
        let engine = Arc::new(ProcessEngine::with_grace(self.terminate_grace));

        let collaborators = Collaborators {
            resolver: Arc::new(self.recipes),
            environments: Arc::new(self.environments),
            tunnel: self.tunnel,
        };

        let (handle, join) = Orchestrator::spawn(
            self.options,
            Arc::clone(&store),
            Arc::clone(&engine),
            collaborators,
            LogDetector::with_defaults(),
        );

        Ok(Harness {
            handle,
            join,
            store,
            engine,
            _tmp: tmp,
        })
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll `cond` every 25ms until it holds or `timeout` elapses.
/// Returns whether the condition was met.
pub async fn wait_for<F>(cond: F, timeout: Duration) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(25)).await;
    }
}
