use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AssistantError;

/// Sentinel content value a chat backend uses to mark the logical end of
/// its own output, distinct from the worker-process terminator.
pub const EOS: &str = "EOS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl FromStr for Role {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(AssistantError::InvalidRole(other.to_string())),
        }
    }
}

/// One chunk of the chat-completion delta stream, as it flows between the
/// worker process and the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenChunk {
    pub role: Option<Role>,
    pub content: String,
}

impl TokenChunk {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role: Some(role),
            content: content.into(),
        }
    }

    pub fn is_eos(&self) -> bool {
        self.content == EOS
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: u64,
    pub chat_id: u64,
    pub role: Role,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshBlobRecord {
    pub id: Uuid,
    pub message_id: u64,
    pub url: String,
    pub owner: Option<u64>,
}
