// src/exec/engine.rs

//! The process execution engine itself.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::errors::{AppdockError, Result};
use crate::exec::stream::spawn_drain;
use crate::types::{ExitOutcome, OutputChannel, OutputLine, ProcessStatus};

/// Interval at which `terminate` re-checks the active map while waiting
/// for the process to go away.
const TERMINATE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait for the forced kill to take effect after escalation.
const KILL_SETTLE: Duration = Duration::from_secs(2);

/// A fully-formed command to run through the platform shell.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub command: String,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            working_dir: None,
            env: Vec::new(),
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Engine-generated identity of one spawned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessHandle(u64);

/// Entry in the engine's active-process map.
#[derive(Debug)]
struct ProcessEntry {
    pid: u32,
    command: String,
    started_at: DateTime<Utc>,
    status: ProcessStatus,
    /// Fires the forced kill inside the reaper task. Taken on escalation.
    kill: Option<oneshot::Sender<()>>,
}

/// A process the engine has just spawned.
///
/// `lines` carries both output channels interleaved in arrival order; it
/// closes once both pipes reach EOF. `exit` resolves when the process has
/// been reaped.
#[derive(Debug)]
pub struct RunningProcess {
    pub handle: ProcessHandle,
    pub pid: u32,
    pub lines: mpsc::Receiver<OutputLine>,
    pub exit: oneshot::Receiver<ExitOutcome>,
}

/// Runs external commands and owns the authoritative map of everything it
/// has spawned. Cheap to clone via `Arc`; callers share one engine.
#[derive(Debug)]
pub struct ProcessEngine {
    active: Arc<Mutex<HashMap<ProcessHandle, ProcessEntry>>>,
    next_handle: AtomicU64,
    grace: Duration,
}

impl ProcessEngine {
    /// Engine with the default 5-second terminate grace period.
    pub fn new() -> Self {
        Self::with_grace(Duration::from_secs(5))
    }

    pub fn with_grace(grace: Duration) -> Self {
        Self {
            active: Arc::new(Mutex::new(HashMap::new())),
            next_handle: AtomicU64::new(1),
            grace,
        }
    }

    /// Spawn a command and start draining its output.
    ///
    /// On success the process is registered in the active map before this
    /// returns. A command that cannot be started at all never enters the
    /// map and yields a distinguished spawn failure.
    pub fn spawn(&self, spec: CommandSpec) -> Result<RunningProcess> {
        info!(cmd = %spec.command, cwd = ?spec.working_dir, "starting process");

        // Build a shell command appropriate for the platform.
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&spec.command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&spec.command);
            c
        };

        if let Some(ref dir) = spec.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in spec.env.iter() {
            cmd.env(key, value);
        }

        // Each child leads its own process group so stop signals reach
        // grandchildren the shell forked without exec.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            AppdockError::Spawn(format!("spawning '{}': {}", spec.command, e))
        })?;

        let pid = child.id().ok_or_else(|| {
            AppdockError::Spawn(format!(
                "process for '{}' exited before its pid could be read",
                spec.command
            ))
        })?;

        let handle = ProcessHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));

        let (line_tx, line_rx) = mpsc::channel::<OutputLine>(64);
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let (exit_tx, exit_rx) = oneshot::channel::<ExitOutcome>();

        if let Some(stdout) = child.stdout.take() {
            spawn_drain(OutputChannel::Stdout, stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_drain(OutputChannel::Stderr, stderr, line_tx);
        }

        {
            let mut active = self.active.lock().expect("active map lock poisoned");
            active.insert(
                handle,
                ProcessEntry {
                    pid,
                    command: spec.command.clone(),
                    started_at: Utc::now(),
                    status: ProcessStatus::Running,
                    kill: Some(kill_tx),
                },
            );
        }

        self.spawn_reaper(handle, pid, spec.command, child, kill_rx, exit_tx);

        debug!(?handle, pid, "process registered");

        Ok(RunningProcess {
            handle,
            pid,
            lines: line_rx,
            exit: exit_rx,
        })
    }

    /// Run a command to completion, forwarding every output line to the
    /// callback, and return its exit code.
    ///
    /// Blocks the calling task until the process exits; run it from a
    /// dedicated task when other work must proceed concurrently. A spawn
    /// failure is forwarded as a synthetic error line through the same
    /// callback before the distinguished error is returned.
    pub async fn execute<F>(&self, spec: CommandSpec, mut on_line: F) -> Result<i32>
    where
        F: FnMut(OutputLine),
    {
        let mut running = match self.spawn(spec) {
            Ok(r) => r,
            Err(e) => {
                on_line(OutputLine::stderr(format!("<appdock: {}>", e)));
                return Err(e);
            }
        };

        while let Some(line) = running.lines.recv().await {
            on_line(line);
        }

        match running.exit.await {
            Ok(outcome) => Ok(outcome.code()),
            Err(_) => Err(AppdockError::Runtime(
                "process reaper dropped before reporting an exit".to_string(),
            )),
        }
    }

    /// Gracefully stop a process by native pid, escalating to a forced
    /// kill after the grace period.
    ///
    /// Idempotent: an unknown or already-dead pid is success, not error.
    /// Returns whether the process is gone.
    pub async fn terminate(&self, pid: u32) -> Result<bool> {
        let handle = {
            let active = self.active.lock().expect("active map lock poisoned");
            match active.iter().find(|(_, e)| e.pid == pid) {
                Some((handle, entry)) if !entry.status.is_terminal() => *handle,
                // Already terminal or never ours: nothing left to stop.
                _ => {
                    debug!(pid, "terminate: process not active; treating as success");
                    return Ok(true);
                }
            }
        };

        info!(pid, "requesting graceful stop");
        send_polite_stop(pid);

        // Give the process the grace period to exit on its own.
        let deadline = Instant::now() + self.grace;
        while Instant::now() < deadline {
            if self.is_gone(handle) {
                debug!(pid, "process exited within grace period");
                return Ok(true);
            }
            sleep(TERMINATE_POLL_INTERVAL).await;
        }

        // Escalate: fire the reaper's kill channel.
        warn!(pid, "grace period elapsed; escalating to forced kill");
        {
            let mut active = self.active.lock().expect("active map lock poisoned");
            if let Some(entry) = active.get_mut(&handle) {
                if let Some(kill) = entry.kill.take() {
                    let _ = kill.send(());
                }
            }
        }

        let settle_deadline = Instant::now() + KILL_SETTLE;
        while Instant::now() < settle_deadline {
            if self.is_gone(handle) {
                return Ok(true);
            }
            sleep(TERMINATE_POLL_INTERVAL).await;
        }

        warn!(pid, "process still present after forced kill");
        Ok(false)
    }

    /// Point-in-time, lock-consistent snapshot of running processes.
    pub fn list_active(&self) -> HashMap<ProcessHandle, u32> {
        let active = self.active.lock().expect("active map lock poisoned");
        active
            .iter()
            .filter(|(_, e)| !e.status.is_terminal())
            .map(|(handle, e)| (*handle, e.pid))
            .collect()
    }

    fn is_gone(&self, handle: ProcessHandle) -> bool {
        let active = self.active.lock().expect("active map lock poisoned");
        match active.get(&handle) {
            None => true,
            Some(entry) => entry.status.is_terminal(),
        }
    }

    /// Own the child for its whole life: wait for exit (or the forced-kill
    /// request), mark the map entry terminal, report the outcome, then
    /// drop the entry.
    fn spawn_reaper(
        &self,
        handle: ProcessHandle,
        pid: u32,
        command: String,
        mut child: tokio::process::Child,
        kill_rx: oneshot::Receiver<()>,
        exit_tx: oneshot::Sender<ExitOutcome>,
    ) {
        let active = Arc::clone(&self.active);

        tokio::spawn(async move {
            let outcome = tokio::select! {
                status_res = child.wait() => match status_res {
                    Ok(status) => {
                        let code = status.code().unwrap_or(-1);
                        info!(pid, exit_code = code, cmd = %command, "process exited");
                        ExitOutcome::Exited(code)
                    }
                    Err(e) => {
                        warn!(pid, error = %e, "waiting for process failed");
                        ExitOutcome::Exited(-1)
                    }
                },
                _ = kill_rx => {
                    info!(pid, cmd = %command, "forced kill requested");
                    send_forced_stop(pid);
                    if let Err(e) = child.kill().await {
                        warn!(pid, error = %e, "failed to kill process");
                    }
                    ExitOutcome::Killed
                }
            };

            {
                let mut active = active.lock().expect("active map lock poisoned");
                if let Some(entry) = active.get_mut(&handle) {
                    entry.status = match outcome {
                        ExitOutcome::Exited(0) => ProcessStatus::Completed,
                        ExitOutcome::Exited(code) => ProcessStatus::Failed(code),
                        ExitOutcome::Killed => ProcessStatus::Killed,
                    };
                    debug!(pid, started_at = %entry.started_at, "process marked terminal");
                }
            }

            // The exit report is the observation point; once it is out the
            // entry can leave the map.
            let _ = exit_tx.send(outcome);

            let mut active = active.lock().expect("active map lock poisoned");
            active.remove(&handle);
        });
    }
}

impl Default for ProcessEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Ask the process to stop without forcing it.
#[cfg(unix)]
fn send_polite_stop(pid: u32) {
    // SIGTERM to the whole process group (the child leads its own); the
    // reaper escalates to SIGKILL if the grace period runs out.
    unsafe {
        libc::kill(-(pid as i32), libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_polite_stop(_pid: u32) {
    // No polite signal on this platform; `terminate` falls through to the
    // forced kill after the grace period.
}

/// Forced stop for the rest of the process group; the shell itself is
/// killed and reaped through `child.kill()`.
#[cfg(unix)]
fn send_forced_stop(pid: u32) {
    unsafe {
        libc::kill(-(pid as i32), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn send_forced_stop(_pid: u32) {}
