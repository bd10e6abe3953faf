//! C7/C11 — message repository.
//!
//! Grounded on `original_source/src/repository/message.py`
//! (`AsyncMessageRepository.create` raising on an unrecognized role) and
//! the registry pattern in `continuum-core/src/voice/orchestrator.rs`
//! (`Arc<Mutex<HashMap<_,_>>>`), generalized to a lock-free `DashMap` —
//! the teacher's own dependency — since every access here is a
//! single-key read or insert with no cross-key invariant to protect.
//!
//! Process-lifetime only: this stands in for the "relational store...
//! external collaborator" named in spec.md §1, not a real database.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::error::Result;
use crate::models::{MessageRecord, Role};

#[derive(Default)]
pub struct MessageRepository {
    messages: DashMap<u64, MessageRecord>,
    by_chat: DashMap<u64, Vec<u64>>,
    next_id: AtomicU64,
}

impl MessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a message id without creating a row yet — used to seed a
    /// stream handle's assistant-message id at `create_message` time,
    /// before the assistant's content exists to persist.
    pub fn reserve_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// `create(chat_id, {role, content}) -> {id, ...}`. `role` is
    /// validated here — an unrecognized value is `InvalidRole` (spec.md
    /// §7), not a parser or orchestrator concern.
    pub fn create(&self, chat_id: u64, role: &str, content: &str) -> Result<MessageRecord> {
        let role = Role::from_str(role)?;
        let id = self.reserve_id();
        Ok(self.insert(id, chat_id, role, content))
    }

    /// Persists a row under a previously reserved id (the seeded assistant
    /// message).
    pub fn create_with_id(
        &self,
        id: u64,
        chat_id: u64,
        role: Role,
        content: &str,
    ) -> Result<MessageRecord> {
        Ok(self.insert(id, chat_id, role, content))
    }

    fn insert(&self, id: u64, chat_id: u64, role: Role, content: &str) -> MessageRecord {
        let record = MessageRecord {
            id,
            chat_id,
            role,
            content: content.to_string(),
            created_at: chrono::Utc::now(),
        };
        self.messages.insert(id, record.clone());
        self.by_chat.entry(chat_id).or_default().push(id);
        record
    }

    /// `last_n(chat_id, n) -> [{role, content, ...}]`, most recent last.
    pub fn last_n(&self, chat_id: u64, n: usize) -> Vec<MessageRecord> {
        let ids = match self.by_chat.get(&chat_id) {
            Some(ids) => ids.clone(),
            None => return Vec::new(),
        };
        ids.iter()
            .rev()
            .take(n)
            .rev()
            .filter_map(|id| self.messages.get(id).map(|r| r.clone()))
            .collect()
    }

    pub fn list(&self, chat_id: u64) -> Vec<MessageRecord> {
        self.last_n(chat_id, usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_role_is_rejected() {
        let repo = MessageRepository::new();
        let err = repo.create(1, "narrator", "hi").unwrap_err();
        assert!(matches!(err, crate::error::AssistantError::InvalidRole(_)));
    }

    #[test]
    fn last_n_returns_most_recent_in_order() {
        let repo = MessageRepository::new();
        for i in 0..5 {
            repo.create(1, "user", &format!("msg {i}")).unwrap();
        }
        let last_two = repo.last_n(1, 2);
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].content, "msg 3");
        assert_eq!(last_two[1].content, "msg 4");
    }

    #[test]
    fn seeded_id_is_usable_before_content_exists() {
        let repo = MessageRepository::new();
        let id = repo.reserve_id();
        let record = repo.create_with_id(id, 1, Role::Assistant, "done").unwrap();
        assert_eq!(record.id, id);
    }
}
