// src/orchestrator/worker.rs

//! The single persistent worker loop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::detect::LogDetector;
use crate::errors::{AppdockError, Result};
use crate::exec::ProcessEngine;
use crate::store::{RecordUpdate, StateStore};
use crate::types::{AppStatus, ExitOutcome, JobState, OutputLine};

use super::jobs::run_job;
use super::{
    Collaborators, Job, OrchestratorEvent, OrchestratorOptions, OutputSink, StateChangedObserver,
};

/// Owns everything a job needs; consumed by [`Worker::run`].
///
/// Exactly one worker exists per orchestrator, so every state-store
/// mutation is serialized by construction.
pub(crate) struct Worker {
    pub(crate) rx: mpsc::Receiver<OrchestratorEvent>,
    /// Handed to detached exit monitors so late process exits flow back
    /// into this loop as events.
    pub(crate) event_tx: mpsc::Sender<OrchestratorEvent>,
    pub(crate) store: Arc<StateStore>,
    pub(crate) engine: Arc<ProcessEngine>,
    pub(crate) collab: Collaborators,
    pub(crate) detector: LogDetector,
    pub(crate) options: OrchestratorOptions,
    pub(crate) sinks: Arc<Mutex<Vec<OutputSink>>>,
    pub(crate) observers: Arc<Mutex<Vec<StateChangedObserver>>>,
    /// Pid of the process the current job is driving, if any. Lets the
    /// error boundary stop a process whose job future was dropped by the
    /// deadline instead of leaking it into the engine's active map.
    pub(crate) inflight: Mutex<Option<u32>>,
}

impl Worker {
    /// Main event loop.
    ///
    /// Each job runs to completion (including its error handling) inside
    /// the loop body before the next event is pulled, which is what
    /// guarantees FIFO completion and at-most-one-in-flight.
    pub(crate) async fn run(mut self) {
        info!("orchestrator worker started");

        while let Some(event) = self.rx.recv().await {
            match event {
                OrchestratorEvent::JobEnqueued(job) => {
                    self.handle_job(job).await;
                }
                OrchestratorEvent::ProcessExited { app, pid, outcome } => {
                    self.reconcile_exit(&app, pid, outcome);
                }
                OrchestratorEvent::Shutdown => {
                    info!("shutdown requested; stopping worker");
                    break;
                }
            }
        }

        info!("orchestrator worker finished");
    }

    /// Run one job inside the single per-job error boundary.
    ///
    /// Nothing a job does may take the loop down: every failure is
    /// surfaced verbatim to the sinks, recorded as the application's ERROR
    /// status, and then the loop moves on.
    async fn handle_job(&self, job: Job) {
        info!(
            app = %job.app,
            action = %job.action,
            enqueued_at = %job.enqueued_at,
            state = ?JobState::Running,
            "job dequeued"
        );

        let result = match self.options.job_deadline {
            Some(deadline) => match timeout(deadline, run_job(self, &job)).await {
                Ok(result) => result,
                Err(_) => Err(AppdockError::Runtime(format!(
                    "{} of '{}' exceeded the job deadline of {:?}",
                    job.action, job.app, deadline
                ))),
            },
            None => run_job(self, &job).await,
        };

        match result {
            Ok(()) => {
                info!(app = %job.app, action = %job.action, state = ?JobState::Succeeded, "job finished");
            }
            Err(e) => {
                error!(app = %job.app, action = %job.action, state = ?JobState::Failed, error = %e, "job failed");

                // Full diagnostic detail goes to the sinks first, then the
                // status mutation.
                self.emit_line(&OutputLine::stderr(format!(
                    "<appdock: {} of '{}' failed: {}>",
                    job.action, job.app, e
                )));

                // A job abandoned mid-process (deadline, tunnel failure)
                // may leave that process behind; stop it before recording
                // the failure. Terminating an already-dead pid is a no-op.
                if let Some(pid) = self.take_inflight() {
                    if let Err(term_err) = self.engine.terminate(pid).await {
                        warn!(app = %job.app, pid, error = %term_err, "could not stop leftover job process");
                    }
                }

                let update = RecordUpdate::new()
                    .status(AppStatus::Error)
                    .error_message(e.to_string())
                    .clear_process_id();

                if let Err(store_err) = self.store.apply(&job.app, update) {
                    // The store itself is down; by definition we cannot
                    // record the status. Log, surface, and keep the loop
                    // alive for the next job.
                    warn!(app = %job.app, error = %store_err, "could not record job failure");
                    self.emit_line(&OutputLine::stderr(format!(
                        "<appdock: could not record failure of '{}': {}>",
                        job.app, store_err
                    )));
                }
            }
        }

        self.notify_state_changed();
    }

    /// A detached service exited after its launch job completed.
    ///
    /// Only reconciles when the stored pid still matches; a stop or
    /// uninstall job that already cleared the pid wins.
    fn reconcile_exit(&self, app: &str, pid: u32, outcome: ExitOutcome) {
        let current = match self.store.get(app) {
            Some(record) if record.process_id == Some(pid) => record,
            _ => {
                debug!(app, pid, "ignoring exit of process no longer recorded");
                return;
            }
        };

        debug!(app, pid, ?outcome, status = %current.status, "reconciling service exit");

        let update = match outcome {
            ExitOutcome::Exited(0) => RecordUpdate::new()
                .status(AppStatus::Stopped)
                .clear_process_id()
                .clear_public_endpoint(),
            ExitOutcome::Exited(code) => RecordUpdate::new()
                .status(AppStatus::Error)
                .clear_process_id()
                .clear_public_endpoint()
                .error_message(format!("service exited unexpectedly with code {code}")),
            ExitOutcome::Killed => RecordUpdate::new()
                .status(AppStatus::Error)
                .clear_process_id()
                .clear_public_endpoint()
                .error_message("service was killed outside a stop job".to_string()),
        };

        if let Err(e) = self.store.apply(app, update) {
            warn!(app, pid, error = %e, "could not record service exit");
            self.emit_line(&OutputLine::stderr(format!(
                "<appdock: could not record exit of '{}': {}>",
                app, e
            )));
            return;
        }

        self.notify_state_changed();
    }

    /// Remember the process the current job is driving.
    pub(crate) fn track_inflight(&self, pid: u32) {
        *self.inflight.lock().expect("inflight slot lock poisoned") = Some(pid);
    }

    /// The current job's process finished or was deliberately handed off.
    pub(crate) fn untrack_inflight(&self) {
        *self.inflight.lock().expect("inflight slot lock poisoned") = None;
    }

    fn take_inflight(&self) -> Option<u32> {
        self.inflight
            .lock()
            .expect("inflight slot lock poisoned")
            .take()
    }

    /// Forward one line to every registered sink.
    pub(crate) fn emit_line(&self, line: &OutputLine) {
        forward_to_sinks(&self.sinks, line);
    }

    /// Fan one line out to the sinks *and* the detector.
    ///
    /// The two consumers are isolated from each other: a panicking sink
    /// never suppresses detection, and the detector never raises at all.
    pub(crate) fn fan_out(&self, line: &OutputLine) -> Option<String> {
        forward_to_sinks(&self.sinks, line);

        catch_unwind(AssertUnwindSafe(|| self.detector.detect(&line.text))).unwrap_or_else(|_| {
            warn!("detector panicked on a line; treating as no match");
            None
        })
    }

    /// Invoked exactly once per completed job (and per reconciled exit),
    /// never per output line, to bound update frequency.
    pub(crate) fn notify_state_changed(&self) {
        let observers = self.observers.lock().expect("observer list lock poisoned");
        for observer in observers.iter() {
            if catch_unwind(AssertUnwindSafe(|| observer())).is_err() {
                warn!("state-changed observer panicked");
            }
        }
    }
}

/// Shared with detached drainers, hence a free function.
pub(crate) fn forward_to_sinks(sinks: &Mutex<Vec<OutputSink>>, line: &OutputLine) {
    let sinks = sinks.lock().expect("sink list lock poisoned");
    for sink in sinks.iter() {
        if catch_unwind(AssertUnwindSafe(|| sink(line))).is_err() {
            warn!("output sink panicked on a line");
        }
    }
}

/// Convenience alias used by job flows.
pub(crate) type JobResult = Result<()>;
