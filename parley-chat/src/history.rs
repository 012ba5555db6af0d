//! Append-only ordered message log, per room.
//!
//! The log is semantically append-only: messages are appended in
//! persistence order, mutated only by deletion marking, and removed only
//! by a hard clear. Soft deletion is a view filter — `history()` always
//! returns the full sequence and callers filter by `deleted_for`
//! membership before display.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::protocol::ChatMessage;

/// Ordered message sequence for one room.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageLog {
    messages: Vec<ChatMessage>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, guarding against duplicate ids.
    ///
    /// A duplicate append (client retry) is silently absorbed and treated
    /// as already delivered: returns `false` and changes nothing.
    pub fn append(&mut self, message: ChatMessage) -> bool {
        if self.contains(&message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Mark a message hidden for the given accounts.
    ///
    /// Returns `false` when no message with `message_id` exists.
    /// `deleted_for` only ever grows.
    pub fn mark_deleted_for(&mut self, message_id: &str, account_ids: &BTreeSet<String>) -> bool {
        match self.messages.iter_mut().find(|m| m.id == message_id) {
            Some(msg) => {
                msg.deleted_for.extend(account_ids.iter().cloned());
                true
            }
            None => false,
        }
    }

    /// Hard clear: physically empty the sequence.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Full ordered log, including soft-deleted entries.
    pub fn history(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// View filter: the log as seen by one account.
    pub fn visible_for(&self, account_id: &str) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| !m.is_deleted_for(account_id))
            .cloned()
            .collect()
    }

    /// Look up a message by id.
    pub fn find(&self, message_id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.messages.iter().any(|m| m.id == message_id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
