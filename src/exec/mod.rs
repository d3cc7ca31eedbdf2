// src/exec/mod.rs

//! Process execution engine.
//!
//! [`ProcessEngine`] is the only owner of the active-process map: it spawns
//! external commands through the platform shell, streams their combined
//! output line-by-line, and can terminate them on demand with a polite
//! signal that escalates to a forced kill after a bounded grace period.

pub mod engine;
pub mod stream;

pub use engine::{CommandSpec, ProcessEngine, ProcessHandle, RunningProcess};
