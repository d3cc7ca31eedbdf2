// src/store/record.rs

//! Durable per-application record and the merge-update vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AppName, AppStatus};

/// The single source of truth for one managed application.
///
/// Invariants (enforced by the orchestrator, checked in tests):
/// - at most one record per application name,
/// - `status == Running` implies `process_id` is set,
/// - any other status implies `process_id` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRecord {
    pub name: AppName,
    pub status: AppStatus,
    pub install_path: Option<String>,
    pub environment_id: Option<String>,
    pub process_id: Option<u32>,
    pub public_endpoint: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppRecord {
    pub(crate) fn new(name: impl Into<AppName>, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            status: AppStatus::NotInstalled,
            install_path: None,
            environment_id: None,
            process_id: None,
            public_endpoint: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Update intent for one optional record field.
///
/// `Keep` (the default) leaves the previously stored value in place, which
/// makes every write a merge rather than a replace: toggling status never
/// accidentally drops the install path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldUpdate<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> FieldUpdate<T> {
    fn apply(self, slot: &mut Option<T>) {
        match self {
            FieldUpdate::Keep => {}
            FieldUpdate::Clear => *slot = None,
            FieldUpdate::Set(v) => *slot = Some(v),
        }
    }
}

/// One atomic record update; built with the fluent methods below and
/// applied by [`StateStore::apply`](crate::store::StateStore::apply).
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    pub status: Option<AppStatus>,
    pub install_path: FieldUpdate<String>,
    pub environment_id: FieldUpdate<String>,
    pub process_id: FieldUpdate<u32>,
    pub public_endpoint: FieldUpdate<String>,
    pub error_message: FieldUpdate<String>,
}

impl RecordUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: AppStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn install_path(mut self, path: impl Into<String>) -> Self {
        self.install_path = FieldUpdate::Set(path.into());
        self
    }

    pub fn environment_id(mut self, env: impl Into<String>) -> Self {
        self.environment_id = FieldUpdate::Set(env.into());
        self
    }

    pub fn process_id(mut self, pid: u32) -> Self {
        self.process_id = FieldUpdate::Set(pid);
        self
    }

    pub fn clear_process_id(mut self) -> Self {
        self.process_id = FieldUpdate::Clear;
        self
    }

    pub fn public_endpoint(mut self, url: impl Into<String>) -> Self {
        self.public_endpoint = FieldUpdate::Set(url.into());
        self
    }

    pub fn clear_public_endpoint(mut self) -> Self {
        self.public_endpoint = FieldUpdate::Clear;
        self
    }

    pub fn clear_install_path(mut self) -> Self {
        self.install_path = FieldUpdate::Clear;
        self
    }

    pub fn clear_environment_id(mut self) -> Self {
        self.environment_id = FieldUpdate::Clear;
        self
    }

    pub fn error_message(mut self, msg: impl Into<String>) -> Self {
        self.error_message = FieldUpdate::Set(msg.into());
        self
    }

    pub fn clear_error_message(mut self) -> Self {
        self.error_message = FieldUpdate::Clear;
        self
    }

    /// Merge this update into an existing record, stamping `updated_at`.
    pub(crate) fn apply_to(self, record: &mut AppRecord, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            record.status = status;
        }
        self.install_path.apply(&mut record.install_path);
        self.environment_id.apply(&mut record.environment_id);
        self.process_id.apply(&mut record.process_id);
        self.public_endpoint.apply(&mut record.public_endpoint);
        self.error_message.apply(&mut record.error_message);
        record.updated_at = now;
    }
}
