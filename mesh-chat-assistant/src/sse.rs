//! C6 — SSE framing.
//!
//! Grounded on `original_source/src/routers/sse_streamer.py` (one
//! `text/event-stream` response wrapping an async generator); since the
//! teacher crate has no HTTP layer of its own, the axum surface is built
//! from the wider pack's `axum::response::sse` conventions (see
//! `other_examples/..._mira-chat-src-server.rs`, which also renders each
//! event via `axum::response::sse::Event` rather than hand-rolling the
//! `event:`/`data:` text). [`StreamEvent`] is the typed event the
//! orchestrator emits; `http::handlers::subscribe` turns a sequence of
//! these into axum's `Sse<_>` response type via `Event`, which performs
//! the wire-format rendering spec.md §4.6 describes.

use crate::models::TokenChunk;
use crate::parser::OutputIndexes;

/// One event the orchestrator emits to a subscriber.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Default (unnamed) event carrying one role/content delta.
    Data(TokenChunk),
    /// Informational: the subscriber is queued behind other active streams.
    Busy,
    /// The parser's completed mesh-block index ranges, as `[[obj_start,
    /// obj_end, exclude_start, exclude_end], ...]`.
    ObjContent(Vec<OutputIndexes>),
    /// Authoritative terminator.
    Done,
    /// A fatal error for the stream.
    Error(String),
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Data(_) => "",
            StreamEvent::Busy => "busy",
            StreamEvent::ObjContent(_) => "obj_content",
            StreamEvent::Done => "done",
            StreamEvent::Error(_) => "error",
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        match self {
            StreamEvent::Data(chunk) => serde_json::json!({
                "role": chunk.role,
                "content": chunk.content,
            }),
            StreamEvent::Busy | StreamEvent::Done => serde_json::json!({}),
            StreamEvent::ObjContent(records) => serde_json::to_value(
                records
                    .iter()
                    .map(|r| [r.obj_start, r.obj_end, r.exclude_start, r.exclude_end])
                    .collect::<Vec<_>>(),
            )
            .unwrap_or(serde_json::Value::Null),
            StreamEvent::Error(message) => serde_json::Value::String(message.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_event_names_match_wire_contract() {
        assert_eq!(StreamEvent::Data(TokenChunk { role: None, content: String::new() }).name(), "");
        assert_eq!(StreamEvent::Busy.name(), "busy");
        assert_eq!(StreamEvent::ObjContent(vec![]).name(), "obj_content");
        assert_eq!(StreamEvent::Done.name(), "done");
        assert_eq!(StreamEvent::Error("x".to_string()).name(), "error");
    }

    #[test]
    fn data_payload_carries_role_and_content() {
        use crate::models::Role;
        let payload = StreamEvent::Data(TokenChunk::new(Role::Assistant, "hi")).payload();
        assert_eq!(payload["role"], "assistant");
        assert_eq!(payload["content"], "hi");
    }

    #[test]
    fn obj_content_payload_is_a_list_of_four_tuples() {
        let record = OutputIndexes {
            obj_start: 1,
            obj_end: 2,
            exclude_start: 0,
            exclude_end: 3,
        };
        let payload = StreamEvent::ObjContent(vec![record]).payload();
        assert_eq!(payload, serde_json::json!([[1, 2, 0, 3]]));
    }
}
