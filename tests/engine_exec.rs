// tests/engine_exec.rs

#![cfg(unix)]

mod common;
use crate::common::init_tracing;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use appdock::errors::AppdockError;
use appdock::exec::{CommandSpec, ProcessEngine};
use appdock::types::{OutputChannel, OutputLine};
use tokio::time::timeout;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn collect_lines() -> (Arc<Mutex<Vec<OutputLine>>>, impl FnMut(OutputLine)) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    (lines, move |line| sink.lock().unwrap().push(line))
}

#[tokio::test]
async fn execute_streams_both_channels_and_returns_exit_code() -> TestResult {
    init_tracing();
    let engine = ProcessEngine::new();

    let (lines, on_line) = collect_lines();
    let code = engine
        .execute(
            CommandSpec::shell("echo to-stdout; echo to-stderr 1>&2"),
            on_line,
        )
        .await?;

    assert_eq!(code, 0);

    let lines = lines.lock().unwrap();
    assert!(lines
        .iter()
        .any(|l| l.channel == OutputChannel::Stdout && l.text == "to-stdout"));
    assert!(lines
        .iter()
        .any(|l| l.channel == OutputChannel::Stderr && l.text == "to-stderr"));
    Ok(())
}

#[tokio::test]
async fn execute_propagates_nonzero_exit_codes() -> TestResult {
    init_tracing();
    let engine = ProcessEngine::new();

    let (_lines, on_line) = collect_lines();
    let code = engine.execute(CommandSpec::shell("exit 3"), on_line).await?;

    assert_eq!(code, 3);
    Ok(())
}

#[tokio::test]
async fn stdout_lines_arrive_in_emission_order() -> TestResult {
    init_tracing();
    let engine = ProcessEngine::new();

    let (lines, on_line) = collect_lines();
    engine
        .execute(CommandSpec::shell("for i in 1 2 3 4 5; do echo line-$i; done"), on_line)
        .await?;

    let stdout: Vec<String> = lines
        .lock()
        .unwrap()
        .iter()
        .filter(|l| l.channel == OutputChannel::Stdout)
        .map(|l| l.text.clone())
        .collect();
    assert_eq!(stdout, vec!["line-1", "line-2", "line-3", "line-4", "line-5"]);
    Ok(())
}

#[tokio::test]
async fn spawn_failure_is_distinguished_and_reported_as_a_line() -> TestResult {
    init_tracing();
    let engine = ProcessEngine::new();

    // An invalid working directory fails the spawn itself, before any
    // shell gets to run.
    let spec = CommandSpec::shell("true").working_dir("/definitely/not/a/real/dir");

    let (lines, on_line) = collect_lines();
    let err = engine
        .execute(spec, on_line)
        .await
        .expect_err("spawn must fail");

    assert!(matches!(err, AppdockError::Spawn(_)), "got {err:?}");

    // The failure was forwarded through the same callback channel.
    let lines = lines.lock().unwrap();
    assert!(
        lines
            .iter()
            .any(|l| l.channel == OutputChannel::Stderr && l.text.contains("Spawn failure")),
        "missing synthetic spawn-failure line in {lines:?}"
    );

    // And nothing entered the active map.
    assert!(engine.list_active().is_empty());
    Ok(())
}

#[tokio::test]
async fn list_active_reflects_running_processes() -> TestResult {
    init_tracing();
    let engine = Arc::new(ProcessEngine::new());

    let running = engine.spawn(CommandSpec::shell("sleep 5"))?;
    let pid = running.pid;

    let active = engine.list_active();
    assert_eq!(active.get(&running.handle), Some(&pid));

    assert!(engine.terminate(pid).await?);
    assert!(engine.list_active().is_empty());
    Ok(())
}

#[tokio::test]
async fn terminate_stops_a_process_within_the_grace_period() -> TestResult {
    init_tracing();
    let engine = ProcessEngine::with_grace(Duration::from_secs(2));

    let mut running = engine.spawn(CommandSpec::shell("sleep 30"))?;
    let pid = running.pid;

    let gone = timeout(Duration::from_secs(5), engine.terminate(pid)).await??;
    assert!(gone);

    // The reaper reports an exit outcome for the stopped process.
    let outcome = timeout(Duration::from_secs(5), &mut running.exit).await??;
    assert!(!outcome.success());
    Ok(())
}

#[tokio::test]
async fn terminate_takes_down_the_whole_process_group() -> TestResult {
    init_tracing();
    let engine = ProcessEngine::with_grace(Duration::from_secs(2));

    // The shell forks `sleep` without exec and stays alive in `wait`, so
    // only a group signal reaches the grandchild.
    let mut running = engine.spawn(CommandSpec::shell("sleep 30 & echo $!; wait"))?;

    let grandchild = loop {
        match timeout(Duration::from_secs(5), running.lines.recv()).await? {
            Some(line) if line.channel == OutputChannel::Stdout => {
                break line.text.trim().parse::<i32>()?;
            }
            Some(_) => continue,
            None => panic!("pipes closed before the background pid arrived"),
        }
    };

    assert!(engine.terminate(running.pid).await?);

    // The forked sleep dies with the group, not just the shell.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if unsafe { libc::kill(grandchild, 0) } != 0 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "background child {grandchild} survived terminate"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Ok(())
}

#[tokio::test]
async fn terminate_is_idempotent_for_unknown_or_finished_pids() -> TestResult {
    init_tracing();
    let engine = ProcessEngine::new();

    // Never spawned by this engine: success, not error.
    assert!(engine.terminate(3_999_999).await?);

    // Spawn something short-lived, let it finish, then terminate it.
    let mut running = engine.spawn(CommandSpec::shell("true"))?;
    let pid = running.pid;
    let _ = timeout(Duration::from_secs(5), &mut running.exit).await??;

    assert!(engine.terminate(pid).await?);
    Ok(())
}

#[tokio::test]
async fn a_closed_line_receiver_does_not_break_the_process() -> TestResult {
    init_tracing();
    let engine = ProcessEngine::new();

    let mut running = engine.spawn(CommandSpec::shell("echo noisy; exit 0"))?;
    // Drop the line receiver immediately; the drain tasks must cope.
    drop(std::mem::replace(
        &mut running.lines,
        tokio::sync::mpsc::channel(1).1,
    ));

    let outcome = timeout(Duration::from_secs(5), running.exit).await??;
    assert!(outcome.success());
    Ok(())
}
