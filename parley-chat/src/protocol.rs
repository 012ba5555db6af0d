//! JSON event protocol between chat clients and the session gateway.
//!
//! Wire format: one JSON object per websocket text frame, tagged by
//! event name:
//! ```text
//! {"event": "message", "data": {"roomId": "...", "msg": {...}}}
//! ```
//!
//! Client → gateway: `join`, `message`, `typing`, `reaction`,
//! `message:delete`, `clear`.
//! Gateway → client: `room:history` (joining connection only),
//! `message`, `typing` (room except sender), `reaction`,
//! `message:deleted`, `room:cleared`, `error` (originating connection
//! only).
//!
//! Payload field names are camelCase for compatibility with browser
//! clients.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Account role, assigned by the external account service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

/// Approval status, owned by the external account service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Pending,
    Approved,
}

/// A participant account, referenced but not owned by the core.
///
/// Only `id` is required for routing; `role` and `status` gate
/// authorization decisions made upstream by the account service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub status: AccountStatus,
}

impl Account {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: Role::default(),
            status: AccountStatus::default(),
        }
    }
}

/// Denormalized snapshot of a replied-to message.
///
/// A snapshot, not a live reference: it renders even after the original
/// message is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRef {
    pub id: String,
    pub text: String,
    pub name: String,
}

/// Reference to an externally stored file attachment.
///
/// The core never touches file bytes; it carries this reference opaquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub file_name: String,
    pub file_size: u64,
    pub file_url: String,
}

/// A chat message as persisted and delivered.
///
/// `id` is client-generated so that retries are idempotent. Mutated only
/// by deletion marking: `deleted_for` grows and nothing else changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub from: String,
    /// Display name snapshot at send time.
    pub name: String,
    #[serde(default)]
    pub text: Option<String>,
    /// Send timestamp, milliseconds since the Unix epoch.
    pub ts: u64,
    #[serde(default)]
    pub reply_to: Option<ReplyRef>,
    #[serde(default)]
    pub file: Option<FileRef>,
    /// Accounts for whom this message is hidden. Grows monotonically.
    #[serde(default)]
    pub deleted_for: BTreeSet<String>,
}

impl ChatMessage {
    /// Create a text message.
    pub fn text(
        id: impl Into<String>,
        from: impl Into<String>,
        name: impl Into<String>,
        text: impl Into<String>,
        ts: u64,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            name: name.into(),
            text: Some(text.into()),
            ts,
            reply_to: None,
            file: None,
            deleted_for: BTreeSet::new(),
        }
    }

    /// Create a file message.
    pub fn file(
        id: impl Into<String>,
        from: impl Into<String>,
        name: impl Into<String>,
        file: FileRef,
        ts: u64,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            name: name.into(),
            text: None,
            ts,
            reply_to: None,
            file: Some(file),
            deleted_for: BTreeSet::new(),
        }
    }

    /// Attach a reply snapshot.
    pub fn with_reply(mut self, reply: ReplyRef) -> Self {
        self.reply_to = Some(reply);
        self
    }

    /// Whether the message carries deliverable content.
    ///
    /// A message needs non-empty text or a file reference; anything else
    /// is malformed input and must be rejected before persistence.
    pub fn has_content(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.is_empty()) || self.file.is_some()
    }

    /// Whether this message is hidden for the given account.
    pub fn is_deleted_for(&self, account_id: &str) -> bool {
        self.deleted_for.contains(account_id)
    }
}

/// Events sent by a client to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "join", rename_all = "camelCase")]
    Join { room_id: String, account: Account },

    #[serde(rename = "message", rename_all = "camelCase")]
    Message { room_id: String, msg: ChatMessage },

    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing {
        room_id: String,
        account_id: String,
        value: bool,
    },

    #[serde(rename = "reaction", rename_all = "camelCase")]
    Reaction {
        room_id: String,
        message_id: String,
        by_account_id: String,
        reaction: String,
    },

    #[serde(rename = "message:delete", rename_all = "camelCase")]
    MessageDelete {
        room_id: String,
        message_id: String,
        requester_id: String,
        for_everyone: bool,
    },

    #[serde(rename = "clear", rename_all = "camelCase")]
    Clear { room_id: String },
}

impl ClientEvent {
    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from a JSON text frame.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(frame).map_err(|e| ProtocolError::DeserializationError(e.to_string()))
    }
}

/// Events sent by the gateway to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "room:history", rename_all = "camelCase")]
    RoomHistory {
        room_id: String,
        history: Vec<ChatMessage>,
    },

    #[serde(rename = "message", rename_all = "camelCase")]
    Message { room_id: String, msg: ChatMessage },

    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing { account_id: String, value: bool },

    #[serde(rename = "reaction", rename_all = "camelCase")]
    Reaction {
        message_id: String,
        by_account_id: String,
        reaction: String,
    },

    #[serde(rename = "message:deleted", rename_all = "camelCase")]
    MessageDeleted {
        room_id: String,
        message_id: String,
        delete_for: Vec<String>,
    },

    #[serde(rename = "room:cleared", rename_all = "camelCase")]
    RoomCleared { room_id: String },

    #[serde(rename = "error", rename_all = "camelCase")]
    Error { code: String, detail: String },
}

impl ServerEvent {
    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from a JSON text frame.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(frame).map_err(|e| ProtocolError::DeserializationError(e.to_string()))
    }
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    ConnectionClosed,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}
