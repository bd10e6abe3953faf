use axum::routing::{delete, get, post};
use axum::Router;

use super::handlers;
use super::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chats/{chat_id}/messages", post(handlers::create_message))
        .route("/chats/{chat_id}/messages", get(handlers::list_messages))
        .route(
            "/chats/{chat_id}/messages/{message_id}/streams/{stream_id}",
            get(handlers::subscribe),
        )
        .route(
            "/chats/{chat_id}/messages/{message_id}/streams/{stream_id}",
            delete(handlers::cancel),
        )
        .with_state(state)
}
