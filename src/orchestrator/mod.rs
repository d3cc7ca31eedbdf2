// src/orchestrator/mod.rs

//! Job orchestrator: the composition root.
//!
//! Discrete actions are enqueued as [`Job`]s onto one bounded event channel
//! and drained by a single persistent worker, strictly in arrival order.
//! The worker drives the process engine, fans every output line out to the
//! registered sinks and the log event detector, reacts to detected
//! endpoints by provisioning tunnels, and writes every transition into the
//! state store. The event enum and handle live here; the loop is in
//! [`worker`], the per-action flows in [`jobs`], the consumed interfaces in
//! [`collab`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ConfigFile;
use crate::detect::LogDetector;
use crate::errors::{AppdockError, Result};
use crate::exec::ProcessEngine;
use crate::store::{AppRecord, StateStore};
use crate::types::{ActionKind, AppName, ExitOutcome, OutputLine};

pub mod collab;
pub mod jobs;
pub mod worker;

pub use collab::{EnvironmentProvisioner, Recipe, RecipeResolver, TunnelProvisioner};

/// Consumer registered to receive every raw output line (append-only,
/// ordered). Must not block; a panicking sink is isolated, not fatal.
pub type OutputSink = Arc<dyn Fn(&OutputLine) + Send + Sync>;

/// Zero-argument hook invoked once per completed job.
pub type StateChangedObserver = Arc<dyn Fn() + Send + Sync>;

/// One queued unit of work. Immutable once created; consumed exactly once
/// by the worker and never persisted.
#[derive(Debug, Clone)]
pub struct Job {
    pub action: ActionKind,
    pub app: AppName,
    pub enqueued_at: DateTime<Utc>,
}

/// Events flowing into the worker loop.
#[derive(Debug)]
pub enum OrchestratorEvent {
    /// A job was enqueued and should run when its turn comes.
    JobEnqueued(Job),
    /// A detached (launched) service exited after its job completed.
    ProcessExited {
        app: AppName,
        pid: u32,
        outcome: ExitOutcome,
    },
    /// Graceful shutdown requested.
    Shutdown,
}

/// Tunable worker behaviour.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Capacity of the bounded event queue; `enqueue` fails fast once full.
    pub queue_capacity: usize,
    /// How long a launched service may start up before it counts as
    /// running without a recognized endpoint line.
    pub launch_settle: Duration,
    /// Optional hard deadline per job. `None` matches the reference
    /// behaviour: a hung process hangs the worker until an explicit stop.
    pub job_deadline: Option<Duration>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            launch_settle: Duration::from_secs(10),
            job_deadline: None,
        }
    }
}

impl OrchestratorOptions {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            queue_capacity: cfg.orchestrator.queue_capacity,
            launch_settle: cfg.launch_settle(),
            job_deadline: cfg.job_deadline(),
        }
    }
}

/// The external collaborators the worker consumes.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn RecipeResolver>,
    pub environments: Arc<dyn EnvironmentProvisioner>,
    pub tunnel: Arc<dyn TunnelProvisioner>,
}

/// Spawns and wires the worker; exists only as a named home for
/// [`Orchestrator::spawn`].
pub struct Orchestrator;

impl Orchestrator {
    /// Start the single worker task and return the embedding handle.
    ///
    /// The worker runs until [`OrchestratorHandle::shutdown`] is called;
    /// jobs already in the queue at that point still complete first.
    pub fn spawn(
        options: OrchestratorOptions,
        store: Arc<StateStore>,
        engine: Arc<ProcessEngine>,
        collaborators: Collaborators,
        detector: LogDetector,
    ) -> (OrchestratorHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel::<OrchestratorEvent>(options.queue_capacity);

        let sinks: Arc<Mutex<Vec<OutputSink>>> = Arc::new(Mutex::new(Vec::new()));
        let observers: Arc<Mutex<Vec<StateChangedObserver>>> = Arc::new(Mutex::new(Vec::new()));

        let worker = worker::Worker {
            rx,
            event_tx: tx.clone(),
            store: Arc::clone(&store),
            engine,
            collab: collaborators,
            detector,
            options,
            sinks: Arc::clone(&sinks),
            observers: Arc::clone(&observers),
            inflight: Mutex::new(None),
        };

        let join = tokio::spawn(worker.run());
        info!("orchestrator worker spawned");

        let handle = OrchestratorHandle {
            tx,
            store,
            sinks,
            observers,
        };

        (handle, join)
    }
}

/// Embedding interface: enqueue actions, query records, register observers.
/// Cloneable; all clones talk to the same worker.
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<OrchestratorEvent>,
    store: Arc<StateStore>,
    sinks: Arc<Mutex<Vec<OutputSink>>>,
    observers: Arc<Mutex<Vec<StateChangedObserver>>>,
}

impl OrchestratorHandle {
    /// Enqueue one action against one application.
    ///
    /// Never blocks: the only failures are a saturated queue
    /// ([`AppdockError::QueueFull`]) or a worker that has already shut
    /// down.
    pub fn enqueue(&self, action: ActionKind, app: impl Into<AppName>) -> Result<()> {
        let job = Job {
            action,
            app: app.into(),
            enqueued_at: Utc::now(),
        };

        self.tx
            .try_send(OrchestratorEvent::JobEnqueued(job))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => AppdockError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => {
                    AppdockError::Runtime("orchestrator worker has shut down".to_string())
                }
            })
    }

    /// Side-effect-free read of one application's record.
    pub fn get_record(&self, app: &str) -> Option<AppRecord> {
        self.store.get(app)
    }

    /// Side-effect-free snapshot of every record, ordered by name.
    pub fn list_all(&self) -> Vec<AppRecord> {
        self.store.list()
    }

    /// Register a consumer for every raw output line.
    pub fn register_output_sink<F>(&self, sink: F)
    where
        F: Fn(&OutputLine) + Send + Sync + 'static,
    {
        let mut sinks = self.sinks.lock().expect("sink list lock poisoned");
        sinks.push(Arc::new(sink));
    }

    /// Register a hook invoked once per completed job.
    pub fn register_state_changed_observer<F>(&self, observer: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut observers = self.observers.lock().expect("observer list lock poisoned");
        observers.push(Arc::new(observer));
    }

    /// Request a graceful stop. Jobs already queued ahead of the request
    /// still complete; the await only covers placing the request.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(OrchestratorEvent::Shutdown).await;
    }
}
