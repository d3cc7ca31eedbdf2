// src/lib.rs

//! appdock: job orchestration and streaming execution core.
//!
//! User actions against managed applications (install, launch, stop,
//! uninstall, certify) are serialized through a single worker which runs
//! external processes, streams their output live, detects service-ready
//! endpoints in that output, provisions public tunnels, and records every
//! lifecycle transition in a durable per-application store.

pub mod config;
pub mod detect;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod orchestrator;
pub mod store;
pub mod types;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ConfigFile;
use crate::detect::LogDetector;
use crate::errors::Result;
use crate::exec::ProcessEngine;
use crate::orchestrator::{Collaborators, Orchestrator, OrchestratorHandle, OrchestratorOptions};
use crate::store::StateStore;

/// High-level entry point for embedders.
///
/// This wires together:
/// - the durable state store (location from config)
/// - the process execution engine (terminate grace from config)
/// - the log event detector (built-ins plus config recognizers)
/// - the orchestrator worker and its handle
///
/// The caller supplies the collaborators the core consumes: recipe
/// resolution, environment prefixes and tunnel provisioning.
pub fn start(cfg: &ConfigFile, collaborators: Collaborators) -> Result<(OrchestratorHandle, JoinHandle<()>)> {
    let store = Arc::new(StateStore::open(cfg.store.path.clone())?);
    let engine = Arc::new(ProcessEngine::with_grace(cfg.terminate_grace()));
    let detector = LogDetector::with_extra(&cfg.recognizer);

    info!(
        recognizers = detector.len(),
        queue_capacity = cfg.orchestrator.queue_capacity,
        "starting orchestrator"
    );

    let options = OrchestratorOptions::from_config(cfg);
    let (handle, join) = Orchestrator::spawn(options, store, engine, collaborators, detector);

    Ok((handle, join))
}
