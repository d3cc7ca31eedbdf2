// src/orchestrator/jobs.rs

//! Per-action job flows.
//!
//! Each flow returns through the worker's single error boundary; nothing
//! here may panic on external-process misbehaviour.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::errors::{AppdockError, Result};
use crate::exec::{CommandSpec, RunningProcess};
use crate::store::RecordUpdate;
use crate::types::{ActionKind, AppStatus, OutputChannel, OutputLine};

use super::collab::Recipe;
use super::worker::{forward_to_sinks, JobResult, Worker};
use super::{Job, OrchestratorEvent};

/// How long after its pipes close a launching service gets to prove it is
/// still alive before the closed pipes count as an exit.
const EOF_EXIT_WINDOW: Duration = Duration::from_millis(500);

/// Dispatch one dequeued job.
pub(crate) async fn run_job(w: &Worker, job: &Job) -> JobResult {
    match job.action {
        ActionKind::Install => run_install(w, &job.app).await,
        ActionKind::Launch => run_launch(w, &job.app).await,
        ActionKind::Stop => run_stop(w, &job.app).await,
        ActionKind::Uninstall => run_uninstall(w, &job.app).await,
        ActionKind::Certify => run_certify(w, &job.app).await,
    }
}

async fn run_install(w: &Worker, app: &str) -> JobResult {
    // A service still running from an earlier launch goes down before the
    // install runs over it.
    if let Some(pid) = w.store.get(app).and_then(|record| record.process_id) {
        info!(app, pid, "terminating service before install");
        w.engine.terminate(pid).await?;
    }

    w.store.apply(
        app,
        RecordUpdate::new()
            .status(AppStatus::Installing)
            .clear_process_id()
            .clear_public_endpoint()
            .clear_error_message(),
    )?;

    let recipe = w.collab.resolver.resolve(app, ActionKind::Install)?;
    let specs = build_specs(w, &recipe)?;

    for spec in specs {
        run_step(w, app, spec).await?;
    }

    let mut update = RecordUpdate::new().status(AppStatus::Installed);
    if let Some(path) = recipe.install_path {
        update = update.install_path(path);
    }
    if let Some(env_id) = recipe.environment_id {
        update = update.environment_id(env_id);
    }
    w.store.apply(app, update)?;

    Ok(())
}

async fn run_launch(w: &Worker, app: &str) -> JobResult {
    let recipe = w.collab.resolver.resolve(app, ActionKind::Launch)?;
    let specs = build_specs(w, &recipe)?;

    let (service_spec, setup_specs) = match specs.split_last() {
        Some((last, rest)) => (last.clone(), rest.to_vec()),
        None => {
            return Err(AppdockError::Runtime(format!(
                "launch recipe for '{app}' has no steps"
            )));
        }
    };

    // Preparatory steps run to completion like install steps.
    for spec in setup_specs {
        run_step(w, app, spec).await?;
    }

    // The final step is the long-lived service.
    let mut running = spawn_with_synthetic_line(w, service_spec)?;
    let pid = running.pid;

    let settle = sleep(w.options.launch_settle);
    tokio::pin!(settle);

    let mut public_endpoint: Option<String> = None;
    // Kept so an early death can cite the service's last complaint.
    let mut last_stderr: Option<String> = None;

    // Stream startup output until the service proves ready (endpoint
    // detected), dies, or the settle window elapses.
    let ready = loop {
        tokio::select! {
            maybe_line = running.lines.recv() => match maybe_line {
                Some(line) => {
                    if line.channel == OutputChannel::Stderr {
                        last_stderr = Some(line.text.clone());
                    }
                    if let Some(local) = w.fan_out(&line) {
                        info!(app, %local, "service endpoint detected; provisioning tunnel");
                        match w.collab.tunnel.provision(&local).await {
                            Ok(url) => {
                                public_endpoint = Some(url);
                                break true;
                            }
                            Err(e) => {
                                // The service is up but unreachable from
                                // outside; fail the job and do not leave
                                // the process behind.
                                let _ = w.engine.terminate(pid).await;
                                return Err(AppdockError::Tunnel(format!(
                                    "provisioning tunnel for '{local}': {e}"
                                )));
                            }
                        }
                    }
                }
                None => {
                    // Pipes closed. Either the process is gone, or it
                    // daemonized; give the exit a moment to show up.
                    match timeout(EOF_EXIT_WINDOW, &mut running.exit).await {
                        Ok(Ok(outcome)) => {
                            return Err(AppdockError::Runtime(startup_failure(
                                app,
                                &format!("code {}", outcome.code()),
                                last_stderr.as_deref(),
                            )));
                        }
                        Ok(Err(_)) | Err(_) => break false,
                    }
                }
            },
            outcome = &mut running.exit => {
                // Flush output already in flight so the failure detail can
                // cite the service's last words.
                while let Ok(Some(line)) = timeout(EOF_EXIT_WINDOW, running.lines.recv()).await {
                    w.fan_out(&line);
                    if line.channel == OutputChannel::Stderr {
                        last_stderr = Some(line.text);
                    }
                }
                let detail = match outcome {
                    Ok(o) => format!("code {}", o.code()),
                    Err(_) => "an unknown outcome".to_string(),
                };
                return Err(AppdockError::Runtime(startup_failure(
                    app,
                    &detail,
                    last_stderr.as_deref(),
                )));
            }
            _ = &mut settle => {
                debug!(app, pid, "settle window elapsed with no endpoint line; considering service running");
                break false;
            }
        }
    };

    let mut update = RecordUpdate::new()
        .status(AppStatus::Running)
        .process_id(pid)
        .clear_error_message();
    if let Some(url) = public_endpoint.clone() {
        update = update.public_endpoint(url);
    }
    if let Some(env_id) = recipe.environment_id {
        update = update.environment_id(env_id);
    }

    if let Err(e) = w.store.apply(app, update) {
        // Without a durable RUNNING record the service would be
        // untrackable; stop it rather than leak it.
        let _ = w.engine.terminate(pid).await;
        return Err(e);
    }

    info!(app, pid, endpoint = ?public_endpoint, ready_by_detection = ready, "service running");

    // The service stays up on purpose; it is no longer the job's to stop.
    w.untrack_inflight();
    detach_service(w, app, running);

    Ok(())
}

async fn run_stop(w: &Worker, app: &str) -> JobResult {
    let pid = w.store.get(app).and_then(|record| record.process_id);

    match pid {
        Some(pid) => {
            info!(app, pid, "stopping service");
            let gone = w.engine.terminate(pid).await?;
            if !gone {
                return Err(AppdockError::Runtime(format!(
                    "process {pid} for '{app}' did not terminate"
                )));
            }
        }
        None => {
            debug!(app, "stop requested but no process recorded");
        }
    }

    w.store.apply(
        app,
        RecordUpdate::new()
            .status(AppStatus::Stopped)
            .clear_process_id()
            .clear_public_endpoint(),
    )?;

    Ok(())
}

async fn run_uninstall(w: &Worker, app: &str) -> JobResult {
    // A still-running service goes down before its files do.
    if let Some(pid) = w.store.get(app).and_then(|record| record.process_id) {
        info!(app, pid, "terminating service before uninstall");
        w.engine.terminate(pid).await?;
        w.store.apply(
            app,
            RecordUpdate::new()
                .status(AppStatus::Stopped)
                .clear_process_id()
                .clear_public_endpoint(),
        )?;
    }

    let recipe = w.collab.resolver.resolve(app, ActionKind::Uninstall)?;
    let specs = build_specs(w, &recipe)?;

    for spec in specs {
        run_step(w, app, spec).await?;
    }

    w.store.apply(
        app,
        RecordUpdate::new()
            .status(AppStatus::NotInstalled)
            .clear_install_path()
            .clear_environment_id()
            .clear_process_id()
            .clear_public_endpoint()
            .clear_error_message(),
    )?;

    Ok(())
}

async fn run_certify(w: &Worker, app: &str) -> JobResult {
    let recipe = w.collab.resolver.resolve(app, ActionKind::Certify)?;
    let specs = build_specs(w, &recipe)?;

    for spec in specs {
        run_step(w, app, spec).await?;
    }

    // Certification only vouches for the install; lifecycle status stays
    // whatever it was.
    w.store
        .apply(app, RecordUpdate::new().clear_error_message())?;

    Ok(())
}

/// Run one recipe step to completion, fanning every line out to the sinks
/// and the detector. A detected endpoint provisions a tunnel and records
/// the public URL even mid-install.
async fn run_step(w: &Worker, app: &str, spec: CommandSpec) -> Result<()> {
    let command = spec.command.clone();
    let mut running = spawn_with_synthetic_line(w, spec)?;

    while let Some(line) = running.lines.recv().await {
        if let Some(local) = w.fan_out(&line) {
            info!(app, %local, "endpoint detected during step; provisioning tunnel");
            match w.collab.tunnel.provision(&local).await {
                Ok(url) => {
                    w.store
                        .apply(app, RecordUpdate::new().public_endpoint(url))?;
                }
                Err(e) => {
                    let _ = w.engine.terminate(running.pid).await;
                    return Err(AppdockError::Tunnel(format!(
                        "provisioning tunnel for '{local}': {e}"
                    )));
                }
            }
        }
    }

    let outcome = running.exit.await.map_err(|_| {
        AppdockError::Runtime(format!(
            "process reaper for step '{command}' dropped before reporting an exit"
        ))
    })?;
    w.untrack_inflight();

    if !outcome.success() {
        return Err(AppdockError::Runtime(format!(
            "step '{}' exited with code {}",
            command,
            outcome.code()
        )));
    }

    Ok(())
}

/// Spawn, forwarding a spawn failure as a synthetic error line through the
/// same sink channel the process output would have used.
fn spawn_with_synthetic_line(w: &Worker, spec: CommandSpec) -> Result<RunningProcess> {
    match w.engine.spawn(spec) {
        Ok(running) => {
            w.track_inflight(running.pid);
            Ok(running)
        }
        Err(e) => {
            w.emit_line(&OutputLine::stderr(format!("<appdock: {e}>")));
            Err(e)
        }
    }
}

/// Failure detail for a service that died before becoming ready, citing
/// the last stderr line when one was seen.
fn startup_failure(app: &str, outcome: &str, last_stderr: Option<&str>) -> String {
    match last_stderr {
        Some(hint) => {
            format!("service for '{app}' exited during startup with {outcome}: {hint}")
        }
        None => format!("service for '{app}' exited during startup with {outcome}"),
    }
}

/// Hand a now-running service over to background tasks: one keeps
/// forwarding its output to the sinks (display only; the detection window
/// closed with the job), one reports the eventual exit back into the
/// worker loop so the record never sticks at RUNNING.
fn detach_service(w: &Worker, app: &str, running: RunningProcess) {
    let RunningProcess {
        pid,
        mut lines,
        exit,
        ..
    } = running;

    let sinks = Arc::clone(&w.sinks);
    let drain_app = app.to_string();
    tokio::spawn(async move {
        while let Some(line) = lines.recv().await {
            forward_to_sinks(&sinks, &line);
        }
        debug!(app = %drain_app, "detached output drain finished");
    });

    let event_tx = w.event_tx.clone();
    let monitor_app = app.to_string();
    tokio::spawn(async move {
        match exit.await {
            Ok(outcome) => {
                let _ = event_tx
                    .send(OrchestratorEvent::ProcessExited {
                        app: monitor_app,
                        pid,
                        outcome,
                    })
                    .await;
            }
            Err(_) => {
                warn!(app = %monitor_app, pid, "exit monitor lost the reaper");
            }
        }
    });
}

/// Turn a recipe into concrete command specs, applying the isolated
/// environment prefix and shared working directory / environment.
fn build_specs(w: &Worker, recipe: &Recipe) -> Result<Vec<CommandSpec>> {
    let prefix = match recipe.environment_id.as_deref() {
        Some(env_id) => {
            let prefix = w.collab.environments.command_prefix(env_id)?;
            if prefix.trim().is_empty() {
                None
            } else {
                Some(prefix)
            }
        }
        None => None,
    };

    let specs = recipe
        .steps
        .iter()
        .map(|step| {
            let command = match prefix.as_deref() {
                Some(p) => format!("{p} {step}"),
                None => step.clone(),
            };

            let mut spec = CommandSpec::shell(command);
            if let Some(ref dir) = recipe.working_dir {
                spec = spec.working_dir(dir.clone());
            }
            for (key, value) in recipe.env.iter() {
                spec = spec.env(key.clone(), value.clone());
            }
            spec
        })
        .collect();

    Ok(specs)
}
