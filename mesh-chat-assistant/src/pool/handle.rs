//! Parent-side handle to one `assistant-worker` child process.
//!
//! Grounded on `other_examples/48ba27bf_..._worker_bridge.rs`'s stdin
//! writer task / stdout reader task split, simplified because (unlike that
//! example) a pool worker is never multiplexed across concurrent requests
//! — the pool lends it out exclusively, so there is no request-id
//! correlation table, just one outbound command sink and one inbound
//! event stream.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::error::{AssistantError, Result};
use crate::worker::protocol::{decode, encode};
use crate::worker::{WorkerCommand, WorkerEvent};

/// One leased worker process. Never shared: the pool hands out exactly
/// one `WorkerHandle` per stream, for the stream's duration.
pub struct WorkerHandle {
    pub(crate) pid: u32,
    child: Child,
    stdin: tokio::process::ChildStdin,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    alive: Arc<AtomicBool>,
}

impl WorkerHandle {
    /// Spawns a fresh `assistant-worker` process configured for
    /// `implementation`, wired with background stdin-writer plumbing and a
    /// stdout-reader task that decodes [`WorkerEvent`] lines.
    pub async fn spawn(
        implementation: &str,
        model_path: Option<&PathBuf>,
        lora_path: Option<&PathBuf>,
    ) -> Result<Self> {
        let binary = worker_binary_path();

        let mut command = Command::new(binary);
        command
            .arg("--implementation")
            .arg(implementation)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(path) = model_path {
            command.arg("--model-path").arg(path);
        }
        if let Some(path) = lora_path {
            command.arg("--lora-path").arg(path);
        }

        let mut child = command
            .spawn()
            .map_err(|e| AssistantError::WorkerFailure(format!("failed to spawn worker: {e}")))?;
        let pid = child.id().unwrap_or(0);

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AssistantError::WorkerFailure("worker stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AssistantError::WorkerFailure("worker stdout unavailable".to_string()))?;

        let (event_tx, events) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));

        let reader_alive = alive.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if !line.trim().is_empty() => match decode::<WorkerEvent>(&line) {
                        Ok(event) => {
                            if event_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!("worker produced malformed event: {e}");
                        }
                    },
                    Ok(Some(_)) => {}
                    Ok(None) | Err(_) => break,
                }
            }
            reader_alive.store(false, Ordering::Release);
        });

        Ok(Self {
            pid,
            child,
            stdin,
            events,
            alive,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub async fn send(&mut self, command: &WorkerCommand) -> Result<()> {
        let json = encode(command)?;
        self.stdin.write_all(json.as_bytes()).await.map_err(AssistantError::Io)?;
        self.stdin.write_all(b"\n").await.map_err(AssistantError::Io)?;
        self.stdin.flush().await.map_err(AssistantError::Io)
    }

    /// Waits for the next event from the worker's stdout, or `None` if the
    /// worker's stdout closed (process died or was killed).
    pub async fn recv(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }

    /// Force-kills the process. Used when the pool drops a dead worker and
    /// when the orchestrator shuts down.
    pub async fn kill(&mut self) {
        let _ = self.child.start_kill();
    }
}

fn worker_binary_path() -> PathBuf {
    let mut path = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("server"));
    path.set_file_name(if cfg!(windows) {
        "assistant-worker.exe"
    } else {
        "assistant-worker"
    });
    path
}
