//! Entry point for the `assistant-worker` child process.
//!
//! Spawned by the pool (`mesh_chat_assistant::pool`) once per worker slot.
//! Loads its backend exactly once, then serves the stdin/stdout command
//! loop in `mesh_chat_assistant::worker::process::run` until `Shutdown` or
//! a closed stdin (parent died).

use std::path::PathBuf;

use mesh_chat_assistant::worker::{backends, process};
use tracing::{error, info};

fn main() {
    let mut implementation = "mock".to_string();
    let mut model_path: Option<PathBuf> = None;
    let mut lora_path: Option<PathBuf> = None;

    // Logging is initialized before argument parsing's own diagnostics run,
    // the same ordering `main.rs` uses for the server binary. Level comes
    // from the environment since the pool spawns this process with only
    // `--implementation`/`--model-path`/`--lora-path`, not the full config.
    let log_level = std::env::var("MESH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    mesh_chat_assistant::logging::init_stderr(&log_level);

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--implementation" => implementation = args.next().unwrap_or(implementation),
            "--model-path" => model_path = args.next().map(PathBuf::from),
            "--lora-path" => lora_path = args.next().map(PathBuf::from),
            other => tracing::warn!(argument = %other, "ignoring unknown argument"),
        }
    }

    info!(pid = std::process::id(), %implementation, "assistant-worker starting");

    let backend = match backends::build(&implementation, model_path.as_deref(), lora_path.as_deref()) {
        Ok(b) => b,
        Err(e) => {
            error!("failed to build backend: {e}");
            std::process::exit(1);
        }
    };

    info!("assistant-worker ready");
    process::run(backend);
    info!("assistant-worker exiting");
}
