// tests/config_load.rs

mod common;
use crate::common::init_tracing;

use appdock::config::{load_and_validate, load_from_path, ConfigFile, RawConfigFile};
use appdock::errors::AppdockError;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn write_config(contents: &str) -> (TempDir, std::path::PathBuf) {
    let tmp = TempDir::new().expect("create temp dir");
    let path = tmp.path().join("Appdock.toml");
    std::fs::write(&path, contents).expect("write config");
    (tmp, path)
}

#[test]
fn empty_file_yields_all_defaults() -> TestResult {
    init_tracing();
    let (_tmp, path) = write_config("");

    let cfg = load_and_validate(&path)?;

    assert_eq!(cfg.orchestrator.queue_capacity, 256);
    assert_eq!(cfg.launch_settle().as_secs(), 10);
    assert_eq!(cfg.terminate_grace().as_secs(), 5);
    assert_eq!(cfg.job_deadline(), None);
    assert_eq!(cfg.store.path, std::path::PathBuf::from(".appdock/state.json"));
    assert!(cfg.recognizer.is_empty());
    Ok(())
}

#[test]
fn full_file_round_trips_every_section() -> TestResult {
    init_tracing();
    let (_tmp, path) = write_config(
        r#"
[orchestrator]
queue_capacity = 8
launch_settle_secs = 3
terminate_grace_secs = 1
job_deadline_secs = 600

[store]
path = "/var/lib/appdock/state.json"

[[recognizer]]
name = "my-framework"
pattern = 'serving UI at (https?://\S+)'
"#,
    );

    let cfg = load_and_validate(&path)?;

    assert_eq!(cfg.orchestrator.queue_capacity, 8);
    assert_eq!(cfg.launch_settle().as_secs(), 3);
    assert_eq!(cfg.terminate_grace().as_secs(), 1);
    assert_eq!(cfg.job_deadline().map(|d| d.as_secs()), Some(600));
    assert_eq!(
        cfg.store.path,
        std::path::PathBuf::from("/var/lib/appdock/state.json")
    );
    assert_eq!(cfg.recognizer.len(), 1);
    assert_eq!(cfg.recognizer[0].name, "my-framework");
    Ok(())
}

#[test]
fn zero_queue_capacity_is_rejected() {
    init_tracing();
    let (_tmp, path) = write_config("[orchestrator]\nqueue_capacity = 0\n");

    let err = load_and_validate(&path).expect_err("capacity 0 must fail");
    assert!(matches!(err, AppdockError::Config(_)), "got {err:?}");
}

#[test]
fn zero_job_deadline_is_rejected() {
    init_tracing();
    let (_tmp, path) = write_config("[orchestrator]\njob_deadline_secs = 0\n");

    let err = load_and_validate(&path).expect_err("deadline 0 must fail");
    assert!(matches!(err, AppdockError::Config(_)), "got {err:?}");
}

#[test]
fn uncompilable_recognizer_pattern_is_rejected() {
    init_tracing();
    let (_tmp, path) = write_config(
        r#"
[[recognizer]]
name = "broken"
pattern = "(unclosed"
"#,
    );

    let err = load_and_validate(&path).expect_err("bad pattern must fail");
    match err {
        AppdockError::Config(msg) => assert!(msg.contains("broken"), "got: {msg}"),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn loading_a_missing_file_is_an_io_error() {
    init_tracing();
    let tmp = TempDir::new().expect("create temp dir");

    let err = load_from_path(tmp.path().join("nope.toml")).expect_err("missing file");
    assert!(matches!(err, AppdockError::Io(_)), "got {err:?}");
}

#[test]
fn malformed_toml_is_a_parse_error() {
    init_tracing();
    let (_tmp, path) = write_config("[orchestrator\nqueue_capacity = 1\n");

    let err = load_from_path(&path).expect_err("malformed toml");
    assert!(matches!(err, AppdockError::Toml(_)), "got {err:?}");
}

#[test]
fn raw_config_validates_via_try_from() -> TestResult {
    init_tracing();

    let raw = RawConfigFile::default();
    let cfg = ConfigFile::try_from(raw)?;
    assert_eq!(cfg.orchestrator.queue_capacity, 256);
    Ok(())
}
