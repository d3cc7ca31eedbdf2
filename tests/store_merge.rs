// tests/store_merge.rs

mod common;
use crate::common::init_tracing;

use appdock::errors::AppdockError;
use appdock::store::{RecordUpdate, StateStore};
use appdock::types::AppStatus;

use proptest::prelude::*;
use tempfile::TempDir;

fn temp_store() -> (TempDir, StateStore) {
    let tmp = TempDir::new().expect("create temp dir");
    let store = StateStore::open(tmp.path().join("state.json")).expect("open store");
    (tmp, store)
}

#[test]
fn upsert_creates_record_with_defaults() {
    init_tracing();
    let (_tmp, store) = temp_store();

    let record = store
        .apply("app1", RecordUpdate::new().status(AppStatus::Installing))
        .expect("apply");

    assert_eq!(record.name, "app1");
    assert_eq!(record.status, AppStatus::Installing);
    assert_eq!(record.install_path, None);
    assert_eq!(record.process_id, None);
    assert_eq!(record.created_at, record.updated_at);
}

#[test]
fn writes_merge_instead_of_replacing() {
    init_tracing();
    let (_tmp, store) = temp_store();

    store
        .apply(
            "app1",
            RecordUpdate::new()
                .status(AppStatus::Installed)
                .install_path("/x"),
        )
        .expect("first apply");

    let record = store
        .apply(
            "app1",
            RecordUpdate::new().status(AppStatus::Running).process_id(7),
        )
        .expect("second apply");

    // Both the old install path and the new pid survive.
    assert_eq!(record.install_path.as_deref(), Some("/x"));
    assert_eq!(record.process_id, Some(7));
    assert_eq!(record.status, AppStatus::Running);
}

#[test]
fn explicit_clear_removes_a_field() {
    init_tracing();
    let (_tmp, store) = temp_store();

    store
        .apply(
            "app1",
            RecordUpdate::new()
                .status(AppStatus::Running)
                .process_id(42)
                .public_endpoint("https://abc.tunnel.example"),
        )
        .expect("apply");

    let record = store
        .apply(
            "app1",
            RecordUpdate::new()
                .status(AppStatus::Stopped)
                .clear_process_id()
                .clear_public_endpoint(),
        )
        .expect("apply clear");

    assert_eq!(record.status, AppStatus::Stopped);
    assert_eq!(record.process_id, None);
    assert_eq!(record.public_endpoint, None);
}

#[test]
fn records_survive_reopen() {
    init_tracing();
    let tmp = TempDir::new().expect("create temp dir");
    let path = tmp.path().join("state.json");

    let created_at = {
        let store = StateStore::open(&path).expect("open store");
        let record = store
            .apply(
                "app1",
                RecordUpdate::new()
                    .status(AppStatus::Installed)
                    .install_path("/opt/app1")
                    .environment_id("env-app1"),
            )
            .expect("apply");
        record.created_at
    };

    let store = StateStore::open(&path).expect("reopen store");
    let record = store.get("app1").expect("record persisted");

    assert_eq!(record.status, AppStatus::Installed);
    assert_eq!(record.install_path.as_deref(), Some("/opt/app1"));
    assert_eq!(record.environment_id.as_deref(), Some("env-app1"));
    assert_eq!(record.created_at, created_at);
}

#[test]
fn list_is_ordered_by_name() {
    init_tracing();
    let (_tmp, store) = temp_store();

    for name in ["zeta", "alpha", "mid"] {
        store
            .apply(name, RecordUpdate::new().status(AppStatus::Installed))
            .expect("apply");
    }

    let names: Vec<_> = store.list().into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["alpha", "mid", "zeta"]);
}

#[test]
fn unwritable_path_is_a_storage_failure_and_rolls_back() {
    init_tracing();
    let tmp = TempDir::new().expect("create temp dir");

    // Parent of the state path is a file, so persisting must fail.
    let blocker = tmp.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").expect("write blocker");

    let store = StateStore::open(blocker.join("state.json")).expect("open store");

    let err = store
        .apply("app1", RecordUpdate::new().status(AppStatus::Installing))
        .expect_err("apply must fail");
    assert!(matches!(err, AppdockError::Storage(_)), "got {err:?}");

    // The failed write left no phantom in-memory record behind.
    assert_eq!(store.get("app1"), None);
}

proptest! {
    /// A status-only update never disturbs previously stored fields,
    /// whatever they were.
    #[test]
    fn status_toggle_preserves_other_fields(
        install_path in "/[a-z]{1,12}",
        env_id in "[a-z]{1,12}",
        pid in 1u32..99999,
    ) {
        let (_tmp, store) = temp_store();

        store.apply(
            "app",
            RecordUpdate::new()
                .status(AppStatus::Running)
                .install_path(install_path.clone())
                .environment_id(env_id.clone())
                .process_id(pid),
        ).unwrap();

        let record = store
            .apply("app", RecordUpdate::new().status(AppStatus::Error))
            .unwrap();

        prop_assert_eq!(record.install_path.as_deref(), Some(install_path.as_str()));
        prop_assert_eq!(record.environment_id.as_deref(), Some(env_id.as_str()));
        prop_assert_eq!(record.process_id, Some(pid));
    }
}
