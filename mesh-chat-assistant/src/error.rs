use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// The one error type returned from every fallible boundary in this crate:
/// the pool, the runner, the parser's finalization step, the repositories,
/// and the HTTP handlers.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("stream {0} not found")]
    NotFound(Uuid),

    #[error("stream {0} already has a subscriber")]
    AlreadySubscribed(Uuid),

    #[error("timed out after {0:?} waiting for the next chunk")]
    Timeout(Duration),

    #[error("worker failure: {0}")]
    WorkerFailure(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("invalid role: {0}")]
    InvalidRole(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AssistantError>;
