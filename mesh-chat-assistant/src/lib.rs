//! Mesh chat assistant: a chat-style interface to a local LLM that emits
//! 3D mesh artifacts interleaved with prose, streamed to clients over SSE.
//!
//! See `SPEC_FULL.md` and `DESIGN.md` at the repository root for the full
//! component breakdown and grounding ledger. Module-to-component mapping:
//!
//! - `worker` — C1, the inference worker process (and its four backends).
//! - `pool` — C2, the worker pool.
//! - `runner` — C3, the stream runner.
//! - `parser` — C4, the incremental mesh parser.
//! - `orchestrator` — C5, the stream orchestrator.
//! - `sse` — C6, SSE framing.
//! - `repository` — C7/C11, persistence adapters.
//! - `config`, `logging`, `http` — ambient stack (C8/C9/C10).

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod pool;
pub mod repository;
pub mod runner;
pub mod sse;
pub mod worker;
