//! Fake collaborators for orchestrator tests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use appdock::errors::{AppdockError, Result};
use appdock::orchestrator::{EnvironmentProvisioner, Recipe, RecipeResolver, TunnelProvisioner};
use appdock::types::{ActionKind, OutputLine};

/// In-memory recipe resolver: a map from (app, action) to a recipe.
///
/// Unknown pairs resolve to an empty recipe, which matches collaborators
/// that have nothing to do for e.g. `certify`.
#[derive(Default)]
pub struct RecipeBook {
    recipes: HashMap<(String, ActionKind), Recipe>,
}

impl RecipeBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, app: &str, action: ActionKind, recipe: Recipe) -> Self {
        self.recipes.insert((app.to_string(), action), recipe);
        self
    }

    /// Shorthand for a single-step recipe with no trimmings.
    pub fn with_step(self, app: &str, action: ActionKind, step: &str) -> Self {
        self.with(
            app,
            action,
            Recipe {
                steps: vec![step.to_string()],
                ..Recipe::default()
            },
        )
    }
}

impl RecipeResolver for RecipeBook {
    fn resolve(&self, app: &str, action: ActionKind) -> Result<Recipe> {
        Ok(self
            .recipes
            .get(&(app.to_string(), action))
            .cloned()
            .unwrap_or_default())
    }
}

/// Tunnel provisioner that always returns the same public URL and records
/// every local endpoint it was asked about.
pub struct StaticTunnel {
    url: String,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl StaticTunnel {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl TunnelProvisioner for StaticTunnel {
    fn provision(
        &self,
        local_endpoint: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        let local = local_endpoint.to_string();
        let url = self.url.clone();
        let requests = Arc::clone(&self.requests);

        Box::pin(async move {
            requests.lock().unwrap().push(local);
            Ok(url)
        })
    }
}

/// Tunnel provisioner that always fails.
pub struct FailingTunnel {
    message: String,
}

impl FailingTunnel {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl TunnelProvisioner for FailingTunnel {
    fn provision(
        &self,
        _local_endpoint: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        let message = self.message.clone();
        Box::pin(async move { Err(AppdockError::Tunnel(message)) })
    }
}

/// Environment provisioner that returns one fixed prefix for every
/// environment id. An empty prefix means "run steps as-is".
pub struct FixedPrefixEnvironments {
    prefix: String,
}

impl FixedPrefixEnvironments {
    pub fn none() -> Self {
        Self {
            prefix: String::new(),
        }
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }
}

impl EnvironmentProvisioner for FixedPrefixEnvironments {
    fn command_prefix(&self, _environment_id: &str) -> Result<String> {
        Ok(self.prefix.clone())
    }
}

/// An output sink that appends the display form of every line to a shared
/// vector. Returns the vector and the sink closure.
pub fn collecting_sink() -> (
    Arc<Mutex<Vec<String>>>,
    impl Fn(&OutputLine) + Send + Sync + 'static,
) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink_lines = Arc::clone(&lines);

    let sink = move |line: &OutputLine| {
        sink_lines.lock().unwrap().push(line.to_string());
    };

    (lines, sink)
}

/// A state-changed observer that counts invocations.
pub fn counting_observer() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let observer_count = Arc::clone(&count);

    let observer = move || {
        observer_count.fetch_add(1, Ordering::SeqCst);
    };

    (count, observer)
}
