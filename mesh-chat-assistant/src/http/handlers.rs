//! C10 — HTTP handlers for the four routes in spec.md §6.
//!
//! Grounded on nothing in the teacher (it has no HTTP layer of its own —
//! it's IPC/socket based); built from the wider pack's `axum` SSE
//! conventions, e.g. `other_examples/..._mira-chat-src-server.rs`'s
//! `mpsc::channel` → `tokio_stream` → `Sse::new(..).keep_alive(..)` shape.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::{http::StatusCode, Json};
use futures_util::stream::Stream;
use serde::Deserialize;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::error::AssistantError;
use crate::models::{MessageRecord, NewMessage};

use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PostMessageBody {
    pub role: String,
    pub content: String,
}

#[derive(serde::Serialize)]
pub struct CreateMessageResponse {
    pub stream_id: Uuid,
    pub message: MessageRecord,
}

impl IntoResponse for AssistantError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AssistantError::NotFound(_) => StatusCode::NOT_FOUND,
            AssistantError::AlreadySubscribed(_) => StatusCode::CONFLICT,
            AssistantError::InvalidRole(_) => StatusCode::BAD_REQUEST,
            AssistantError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AssistantError::WorkerFailure(_) | AssistantError::PersistenceFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AssistantError::Io(_) | AssistantError::Serde(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// `POST /chats/{chat_id}/messages`
pub async fn create_message(
    State(state): State<AppState>,
    Path(chat_id): Path<u64>,
    Json(body): Json<PostMessageBody>,
) -> Result<impl IntoResponse, AssistantError> {
    use std::str::FromStr;
    let role = crate::models::Role::from_str(&body.role)?;
    let (stream_id, message) = state
        .orchestrator
        .create_message(chat_id, NewMessage { role, content: body.content })?;
    Ok(Json(CreateMessageResponse { stream_id, message }))
}

/// `GET /chats/{chat_id}/messages/{message_id}/streams/{stream_id}`
///
/// `message_id` identifies the route per spec.md §6 but carries no
/// additional lookup beyond the stream id — the handle is already
/// chat-scoped and uniquely keyed by `stream_id`.
pub async fn subscribe(
    State(state): State<AppState>,
    Path((chat_id, _message_id, stream_id)): Path<(u64, u64, Uuid)>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AssistantError> {
    let events = state.orchestrator.subscribe(chat_id, stream_id)?;
    let wire = events.map(|event| {
        let mut axum_event = Event::default().data(event.payload().to_string());
        let name = event.name();
        if !name.is_empty() {
            axum_event = axum_event.event(name);
        }
        Ok(axum_event)
    });
    Ok(Sse::new(wire).keep_alive(KeepAlive::default()))
}

/// `DELETE /chats/{chat_id}/messages/{message_id}/streams/{stream_id}`
pub async fn cancel(
    State(state): State<AppState>,
    Path((_chat_id, _message_id, stream_id)): Path<(u64, u64, Uuid)>,
) -> Result<StatusCode, AssistantError> {
    state.orchestrator.stop(stream_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /chats/{chat_id}/messages`
pub async fn list_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<u64>,
) -> Json<Vec<MessageRecord>> {
    Json(state.messages.list(chat_id))
}
