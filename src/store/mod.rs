// src/store/mod.rs

//! Durable state store for application records.
//!
//! One JSON file holds every [`AppRecord`] keyed by application name. All
//! mutation goes through [`StateStore::apply`], which merges one
//! [`RecordUpdate`] under the store lock and persists the whole map with a
//! write-temp-then-rename so a crash mid-write never leaves a torn file.
//! Reads never block each other for long: they clone out of the in-memory
//! map under the same short-lived lock.

pub mod record;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, info};

use crate::errors::{AppdockError, Result};
use crate::types::AppName;

pub use record::{AppRecord, FieldUpdate, RecordUpdate};

/// Thread-safe, file-backed store of application records.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    records: Mutex<BTreeMap<AppName, AppRecord>>,
}

impl StateStore {
    /// Open (or create) the store at `path`.
    ///
    /// A missing file starts the store empty; a present but unreadable or
    /// unparsable file is a storage failure, not silently discarded state.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let records = if path.exists() {
            let contents = fs::read_to_string(&path)
                .map_err(|e| AppdockError::Storage(format!("reading {}: {}", path.display(), e)))?;
            serde_json::from_str(&contents)
                .map_err(|e| AppdockError::Storage(format!("parsing {}: {}", path.display(), e)))?
        } else {
            BTreeMap::new()
        };

        info!(path = %path.display(), "state store opened");

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Atomically upsert one record.
    ///
    /// Unsupplied fields keep their previous values (merge, not replace);
    /// either every supplied field lands together with a fresh `updated_at`
    /// or, on a persistence error, the in-memory change is rolled back and
    /// a storage failure is returned.
    pub fn apply(&self, name: &str, update: RecordUpdate) -> Result<AppRecord> {
        let now = Utc::now();

        let mut records = self.records.lock().expect("state store lock poisoned");

        let previous = records.get(name).cloned();

        let record = records
            .entry(name.to_string())
            .or_insert_with(|| AppRecord::new(name, now));
        update.apply_to(record, now);
        let updated = record.clone();

        debug!(
            app = name,
            status = %updated.status,
            pid = ?updated.process_id,
            "record updated"
        );

        if let Err(e) = persist(&self.path, &records) {
            // Keep memory and disk consistent: undo the upsert.
            match previous {
                Some(prev) => {
                    records.insert(name.to_string(), prev);
                }
                None => {
                    records.remove(name);
                }
            }
            return Err(e);
        }

        Ok(updated)
    }

    /// Point-in-time copy of one record, if any.
    pub fn get(&self, name: &str) -> Option<AppRecord> {
        let records = self.records.lock().expect("state store lock poisoned");
        records.get(name).cloned()
    }

    /// Point-in-time copy of all records, ordered by application name.
    pub fn list(&self) -> Vec<AppRecord> {
        let records = self.records.lock().expect("state store lock poisoned");
        records.values().cloned().collect()
    }
}

/// Serialize the whole map next to the target file, then rename over it.
fn persist(path: &Path, records: &BTreeMap<AppName, AppRecord>) -> Result<()> {
    let json = serde_json::to_string_pretty(records)
        .map_err(|e| AppdockError::Storage(format!("serializing state: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                AppdockError::Storage(format!("creating {}: {}", parent.display(), e))
            })?;
        }
    }

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)
        .map_err(|e| AppdockError::Storage(format!("writing {}: {}", tmp.display(), e)))?;
    fs::rename(&tmp, path).map_err(|e| {
        AppdockError::Storage(format!(
            "renaming {} to {}: {}",
            tmp.display(),
            path.display(),
            e
        ))
    })?;

    Ok(())
}
