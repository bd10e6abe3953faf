//! Wire protocol between the orchestrator (parent process) and one
//! `assistant-worker` child process, carried as newline-delimited JSON over
//! the child's stdin/stdout.
//!
//! One worker ever runs one generation at a time (the pool lends it out
//! exclusively for the duration of a stream), so unlike a general-purpose
//! RPC bridge there is no request-id correlation: `Generate` starts the
//! only in-flight request, `Cancel` targets it, and every `Event` on
//! stdout belongs to it.

use serde::{Deserialize, Serialize};

use crate::models::TokenChunk;

/// Sent from the orchestrator to a worker process, one line of JSON each.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum WorkerCommand {
    /// Run one inference over `history` (ordered chat turns).
    Generate { history: Vec<TokenChunk> },
    /// Cooperative cancellation of the in-flight `Generate`, if any.
    Cancel,
    /// Terminate the worker process cleanly.
    Shutdown,
}

/// Sent from a worker process to the orchestrator, one line of JSON each.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum WorkerEvent {
    /// One role/content delta produced during generation.
    Chunk(TokenChunk),
    /// The backend raised an error; always immediately followed by `Done`.
    Error { message: String },
    /// Terminator: generation finished, errored, or was cancelled.
    Done,
}

pub fn encode(value: &impl Serialize) -> serde_json::Result<String> {
    serde_json::to_string(value)
}

pub fn decode<T: for<'de> Deserialize<'de>>(line: &str) -> serde_json::Result<T> {
    serde_json::from_str(line)
}
