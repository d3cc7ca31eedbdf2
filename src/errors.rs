// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppdockError {
    /// Command could not be started at all (missing executable, bad
    /// working directory, permission denied).
    #[error("Spawn failure: {0}")]
    Spawn(String),

    /// Process started but exited non-zero or failed mid-stream.
    #[error("Runtime failure: {0}")]
    Runtime(String),

    /// The durable record store could not be read or written.
    #[error("Storage failure: {0}")]
    Storage(String),

    /// Tunnel provisioning failed after a successful process start.
    #[error("Tunnel failure: {0}")]
    Tunnel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The bounded job queue is full; the caller should retry later.
    #[error("Job queue is full")]
    QueueFull,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AppdockError>;
