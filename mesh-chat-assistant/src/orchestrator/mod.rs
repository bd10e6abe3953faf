//! C5 — the stream orchestrator (the service layer).
//!
//! Grounded on `original_source/src/services/message.py`
//! (`MessageService.create_stream`) for the event ordering (`error?` then
//! `obj_content` then `done`, in a try/except/else/finally) and the
//! EOS-content-chunk-stops-without-forwarding rule. The task-per-
//! subscription shape (`tokio::spawn` + `UnboundedReceiverStream`) is
//! grounded on `continuum-core/src/voice/orchestrator.rs`'s registry
//! pattern, generalized from voice sessions to mesh streams and rebuilt
//! as an explicitly constructed value (spec.md §9: no module-level
//! singletons) rather than a process-wide static.

mod handle;

use std::sync::Arc;

pub use handle::StreamHandle;

use dashmap::DashMap;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AssistantConfig;
use crate::error::{AssistantError, Result};
use crate::models::{MessageRecord, NewMessage, Role};
use crate::parser::MeshParser;
use crate::pool::WorkerPool;
use crate::repository::{BlobRepository, MessageRepository};
use crate::runner::{self, RunnerEvent, RunnerState};
use crate::sse::StreamEvent;

/// Only the latest user turn is sent to the worker as chat history — this
/// preserves `original_source/src/services/message.py`'s behavior, which
/// spec.md §9 flags as possibly unintentional but keeps rather than
/// reconciling.
const HISTORY_TURNS: usize = 1;

pub struct Orchestrator {
    pool: Arc<WorkerPool>,
    messages: Arc<MessageRepository>,
    blobs: Arc<BlobRepository>,
    handles: Arc<DashMap<Uuid, Arc<StreamHandle>>>,
}

impl Orchestrator {
    pub fn new(
        assistant_config: &AssistantConfig,
        messages: Arc<MessageRepository>,
        blobs: Arc<BlobRepository>,
    ) -> Self {
        Self {
            pool: Arc::new(WorkerPool::new(assistant_config)),
            messages,
            blobs,
            handles: Arc::new(DashMap::new()),
        }
    }

    /// Persists the user message, mints a fresh stream id, registers a
    /// handle. Does not start inference.
    pub fn create_message(
        &self,
        chat_id: u64,
        message: NewMessage,
    ) -> Result<(Uuid, MessageRecord)> {
        let persisted = self
            .messages
            .create(chat_id, message.role.as_str(), &message.content)?;
        let assistant_message_id = self.messages.reserve_id();
        let handle = Arc::new(StreamHandle::new(chat_id, assistant_message_id));
        let stream_id = handle.id;
        self.handles.insert(stream_id, handle);
        Ok((stream_id, persisted))
    }

    /// `stop(stream_id)`. Sets the handle's `is_running` to false.
    /// Idempotent. Does not remove the handle — the subscriber loop
    /// cleans up.
    pub fn stop(&self, stream_id: Uuid) -> Result<()> {
        let handle = self
            .handles
            .get(&stream_id)
            .ok_or(AssistantError::NotFound(stream_id))?;
        handle.stop();
        Ok(())
    }

    /// Fails with `NotFound` if the handle is unknown, or
    /// `AlreadySubscribed` if a subscriber already claimed this stream.
    /// Otherwise spawns the chunk-forwarding task and returns its event
    /// stream immediately.
    pub fn subscribe(
        &self,
        chat_id: u64,
        stream_id: Uuid,
    ) -> Result<UnboundedReceiverStream<StreamEvent>> {
        let handle = self
            .handles
            .get(&stream_id)
            .map(|h| h.clone())
            .ok_or(AssistantError::NotFound(stream_id))?;
        if handle.chat_id != chat_id {
            return Err(AssistantError::NotFound(stream_id));
        }
        if !handle.claim_subscriber() {
            return Err(AssistantError::AlreadySubscribed(stream_id));
        }

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let pool = self.pool.clone();
        let messages = self.messages.clone();
        let blobs = self.blobs.clone();
        let handles = self.handles.clone();

        tokio::spawn(async move {
            drive_stream(handle, pool, messages, blobs, tx).await;
            handles.remove(&stream_id);
        });

        Ok(UnboundedReceiverStream::new(rx))
    }

    /// Cancels every live handle and tears down the pool. Subscribers
    /// whose streams were live at shutdown see their next receive fail —
    /// the error surfaces as an `error` event via the normal chunk loop.
    pub async fn shutdown(&self) {
        for entry in self.handles.iter() {
            entry.value().stop();
        }
        self.pool.shutdown().await;
    }
}

async fn drive_stream(
    handle: Arc<StreamHandle>,
    pool: Arc<WorkerPool>,
    messages: Arc<MessageRepository>,
    blobs: Arc<BlobRepository>,
    tx: tokio::sync::mpsc::UnboundedSender<StreamEvent>,
) {
    let history = messages.last_n(handle.chat_id, HISTORY_TURNS);
    let history: Vec<_> = history
        .into_iter()
        .map(|m| crate::models::TokenChunk {
            role: Some(m.role),
            content: m.content,
        })
        .collect();

    let worker = match pool.try_acquire().await {
        Ok(Some(worker)) => worker,
        Ok(None) => {
            let _ = tx.send(StreamEvent::Busy);
            match pool.acquire().await {
                Ok(worker) => worker,
                Err(e) => {
                    let _ = tx.send(StreamEvent::Error(e.to_string()));
                    let _ = tx.send(StreamEvent::ObjContent(Vec::new()));
                    let _ = tx.send(StreamEvent::Done);
                    return;
                }
            }
        }
        Err(e) => {
            let _ = tx.send(StreamEvent::Error(e.to_string()));
            let _ = tx.send(StreamEvent::ObjContent(Vec::new()));
            let _ = tx.send(StreamEvent::Done);
            return;
        }
    };

    let (mut events, join) = runner::spawn(worker, history, handle.cancel.clone());

    let mut parser = MeshParser::new();
    let mut tokens: Vec<String> = Vec::new();
    let mut runner_error: Option<String> = None;

    while let Some(event) = events.recv().await {
        match event {
            RunnerEvent::Chunk(chunk) => {
                if chunk.is_eos() {
                    handle.stop();
                    break;
                }
                if !handle.is_running() {
                    handle.stop();
                    break;
                }
                tokens.push(chunk.content.clone());
                parser.process_token(&chunk.content);
                let _ = tx.send(StreamEvent::Data(chunk));
            }
            RunnerEvent::Error(message) => {
                runner_error = Some(message);
            }
        }
    }

    let outcome = match join.await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            warn!("runner task panicked: {e}");
            None
        }
    };

    if let Some(message) = &runner_error {
        let _ = tx.send(StreamEvent::Error(message.clone()));
    }

    let records = parser.finish();
    let parsed = MeshParser::extract(&tokens, &records);

    match messages.create_with_id(
        handle.assistant_message_id,
        handle.chat_id,
        Role::Assistant,
        &parsed.message_content,
    ) {
        Ok(persisted) => {
            for body in &parsed.obj_contents {
                if let Err(e) = blobs.save(persisted.id, body.as_bytes()).await {
                    let _ = tx.send(StreamEvent::Error(e.to_string()));
                }
            }
        }
        Err(e) => {
            let _ = tx.send(StreamEvent::Error(e.to_string()));
        }
    }

    let _ = tx.send(StreamEvent::ObjContent(records));
    let _ = tx.send(StreamEvent::Done);

    if let Some(outcome) = outcome {
        if !matches!(outcome.state, RunnerState::Completed | RunnerState::Cancelled | RunnerState::Errored) {
            warn!("runner finished in an unexpected state");
        }
        pool.release(outcome.worker).await;
    }

    info!(stream_id = %handle.id, "stream terminated");
}
