//! C1 — the inference worker process.
//!
//! This module is shared by both sides of the process boundary: the
//! `assistant-worker` binary (`src/bin/assistant_worker.rs`) calls
//! [`process::run`] after building a backend with [`backends::build`]; the
//! pool (`crate::pool`) speaks [`protocol`] to a spawned child.

pub mod backends;
pub mod process;
pub mod protocol;

pub use protocol::{WorkerCommand, WorkerEvent};
