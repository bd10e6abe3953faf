//! C3 — the stream runner.
//!
//! Grounded on `original_source/src/assistant/assistant_runner.py`
//! (`AsyncProcessAssistantRunner`: `queue.get(timeout=60)` plus a
//! `stop_event`) and the cancellation-flag pattern shared with the worker
//! process in `other_examples/..._worker_main.rs`. Re-architected per
//! spec.md §9 as an explicit state machine driven by message passing
//! (`tokio::select!` over the worker's event stream, a 60s deadline, and a
//! cancellation `Notify`) instead of generator `.close()`/`.throw()`
//! semantics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};

use crate::error::AssistantError;
use crate::models::TokenChunk;
use crate::pool::WorkerHandle;
use crate::worker::{WorkerCommand, WorkerEvent};

const RECEIVE_DEADLINE: Duration = Duration::from_secs(60);

/// Upper bound on how long `spawn`'s cancellation branch waits for the
/// worker's own `Done` terminator before giving up and returning the worker
/// to the pool anyway. Without this drain a later borrower could observe
/// stray events left over from the cancelled generation on the same pipe.
const CANCEL_DRAIN_DEADLINE: Duration = Duration::from_secs(2);

/// `Idle` never appears as an observable state here — `spawn` moves
/// straight to `Running` — but it is named to keep the state machine's
/// vocabulary aligned with spec.md §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Running,
    Completed,
    Errored,
    Cancelled,
}

/// One event delivered to the orchestrator's chunk loop.
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    Chunk(TokenChunk),
    Error(String),
}

/// Shared between the orchestrator's stream handle and a running
/// `StreamRunner` task: flips to request cooperative cancellation.
#[derive(Debug, Default)]
pub struct CancelSignal {
    flag: AtomicBool,
    wake: Notify,
}

impl CancelSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
        self.wake.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// What a finished runner task hands back so the orchestrator can release
/// the worker to the pool.
pub struct RunnerOutcome {
    pub worker: WorkerHandle,
    pub state: RunnerState,
}

/// Starts driving `worker` through one request. Returns immediately with
/// an event receiver (closed once the stream terminates) and a join handle
/// that resolves to the final [`RunnerOutcome`].
pub fn spawn(
    mut worker: WorkerHandle,
    history: Vec<TokenChunk>,
    cancel: Arc<CancelSignal>,
) -> (
    mpsc::UnboundedReceiver<RunnerEvent>,
    tokio::task::JoinHandle<RunnerOutcome>,
) {
    let (tx, rx) = mpsc::unbounded_channel();

    let join = tokio::spawn(async move {
        if let Err(e) = worker.send(&WorkerCommand::Generate { history }).await {
            let _ = tx.send(RunnerEvent::Error(e.to_string()));
            return RunnerOutcome {
                worker,
                state: RunnerState::Errored,
            };
        }

        // Correctness relies on the flag check at the top of each iteration,
        // not on `Notify` delivery: `notify_waiters` only wakes a task that
        // is already parked on `notified()`, so a cancellation that lands
        // between iterations could otherwise be missed until the 60s
        // deadline. The per-iteration check closes that gap; `Notify` is
        // purely a latency optimization to "abort the in-flight receive"
        // (spec.md §4.3) rather than the correctness mechanism itself — the
        // 60s deadline is the documented worst case either way.
        let state = loop {
            if cancel.is_cancelled() {
                let _ = worker.send(&WorkerCommand::Cancel).await;
                drain_until_done(&mut worker, &tx).await;
                break RunnerState::Cancelled;
            }

            let receive = worker.recv();
            let wake = cancel.wake.notified();
            tokio::select! {
                biased;

                _ = wake => continue,

                result = tokio::time::timeout(RECEIVE_DEADLINE, receive) => {
                    match result {
                        Err(_elapsed) => {
                            if cancel.is_cancelled() {
                                break RunnerState::Cancelled;
                            }
                            let _ = tx.send(RunnerEvent::Error(
                                AssistantError::Timeout(RECEIVE_DEADLINE).to_string(),
                            ));
                            break RunnerState::Errored;
                        }
                        Ok(None) => {
                            let _ = tx.send(RunnerEvent::Error(
                                "worker connection closed unexpectedly".to_string(),
                            ));
                            break RunnerState::Errored;
                        }
                        Ok(Some(WorkerEvent::Chunk(chunk))) => {
                            let _ = tx.send(RunnerEvent::Chunk(chunk));
                            // A closed `tx` just means the subscriber is gone;
                            // keep draining so the worker still reaches its
                            // terminator before the worker is released.
                        }
                        Ok(Some(WorkerEvent::Error { message })) => {
                            let _ = tx.send(RunnerEvent::Error(message));
                            // Per spec: a worker error is fatal for the stream but
                            // not for the worker — it still emits its terminator,
                            // so keep looping for `Done`.
                        }
                        Ok(Some(WorkerEvent::Done)) => {
                            break if cancel.is_cancelled() {
                                RunnerState::Cancelled
                            } else {
                                RunnerState::Completed
                            };
                        }
                    }
                }
            }
        };

        RunnerOutcome { worker, state }
    });

    (rx, join)
}

/// Drains `worker`'s event stream until its `Done` terminator, a closed
/// pipe, or `CANCEL_DRAIN_DEADLINE` elapses — whichever comes first. Chunks
/// observed here are discarded rather than forwarded: the cancellation
/// invariant (spec.md §8) bounds the subscriber to at most one further
/// `data` event after `stop`, and that allowance is already spent by the
/// chunk (if any) in flight through the `select!` when cancellation was
/// noticed. This drain exists only to empty the pipe before the worker goes
/// back to the pool, not to surface more output.
async fn drain_until_done(worker: &mut WorkerHandle, tx: &mpsc::UnboundedSender<RunnerEvent>) {
    let deadline = tokio::time::Instant::now() + CANCEL_DRAIN_DEADLINE;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return;
        }
        match tokio::time::timeout(remaining, worker.recv()).await {
            Ok(Some(WorkerEvent::Chunk(_))) => continue,
            Ok(Some(WorkerEvent::Error { message })) => {
                let _ = tx.send(RunnerEvent::Error(message));
            }
            Ok(Some(WorkerEvent::Done)) | Ok(None) | Err(_) => return,
        }
    }
}
