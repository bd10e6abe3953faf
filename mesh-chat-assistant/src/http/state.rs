use std::sync::Arc;

use crate::orchestrator::Orchestrator;
use crate::repository::MessageRepository;

/// Shared `axum` state — the orchestrator plus whatever a handler needs
/// that isn't reachable through it (the message repo, for the plain list
/// endpoint which doesn't touch streams at all).
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub messages: Arc<MessageRepository>,
}
