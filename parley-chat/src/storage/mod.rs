//! Persistent storage layer for rooms and message logs.
//!
//! Architecture:
//! ```text
//! ┌──────────────┐   room ops     ┌──────────────┐
//! │ SessionGateway│ ─────────────► │  RoomStore   │
//! │ (in-memory)  │                │  (trait)     │
//! └──────────────┘                └──────┬───────┘
//!                                        │
//!                          ┌─────────────┴─────────────┐
//!                          ▼                           ▼
//!                   ┌─────────────┐            ┌──────────────┐
//!                   │ MemoryStore │            │ RocksStore   │
//!                   │ (HashMap)   │            │ CF "rooms"   │
//!                   └─────────────┘            │ CF "logs"    │
//!                                              └──────────────┘
//! ```
//!
//! The gateway never assumes a backend: an in-process map and a durable
//! database satisfy the same contract. Methods are synchronous and
//! object-safe; the gateway runs them off the async reactor and bounds
//! their latency.

pub mod memory;
pub mod rocks;

pub use memory::MemoryStore;
pub use rocks::{RocksStore, StoreConfig};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::history::MessageLog;
use crate::protocol::ChatMessage;

/// A room as persisted: membership plus its ordered message log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub room_id: String,
    pub participants: BTreeSet<String>,
    pub log: MessageLog,
}

impl RoomRecord {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            participants: BTreeSet::new(),
            log: MessageLog::new(),
        }
    }
}

/// Storage errors.
///
/// Any variant reaching the gateway surfaces to the caller as
/// `StorageUnavailable` — a join or send is never silently dropped.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// Backend database error
    DatabaseError(String),
    /// Serialization failed
    SerializationError(String),
    /// Deserialization failed
    DeserializationError(String),
    /// Compression error
    CompressionError(String),
    /// I/O error
    IoError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::DatabaseError(e) => write!(f, "Database error: {e}"),
            StoreError::SerializationError(e) => write!(f, "Serialization error: {e}"),
            StoreError::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            StoreError::CompressionError(e) => write!(f, "Compression error: {e}"),
            StoreError::IoError(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Storage contract for room membership and message history.
///
/// Unknown room ids are not errors: reads return empty values and
/// lifecycle operations are no-ops, matching the lazy-creation model
/// where a room exists from its first join or first message.
pub trait RoomStore: Send + Sync {
    /// Idempotent lazy creation: the first call for an unseen id persists
    /// an empty room, later calls return the stored one.
    fn get_or_create_room(&self, room_id: &str) -> Result<RoomRecord, StoreError>;

    /// Record a participant. Adding an already-present participant is a
    /// no-op.
    fn add_participant(&self, room_id: &str, account_id: &str) -> Result<(), StoreError>;

    /// Append to the room's log, creating the room if unseen.
    ///
    /// Returns `Ok(false)` for a duplicate message id: the append is
    /// absorbed and nothing changes.
    fn append_message(&self, room_id: &str, message: ChatMessage) -> Result<bool, StoreError>;

    /// Add the given accounts to a message's `deleted_for` set.
    ///
    /// Returns `Ok(false)` when no such message exists in the room.
    fn mark_deleted(
        &self,
        room_id: &str,
        message_id: &str,
        account_ids: &BTreeSet<String>,
    ) -> Result<bool, StoreError>;

    /// Hard-clear the room's message log, keeping membership.
    fn clear_messages(&self, room_id: &str) -> Result<(), StoreError>;

    /// Remove the room entirely: membership and log. Used by account
    /// removal and admin purge flows.
    fn delete_room(&self, room_id: &str) -> Result<(), StoreError>;

    /// Full ordered history including soft-deleted entries. Filtering by
    /// viewer is the caller's responsibility.
    fn history(&self, room_id: &str) -> Result<Vec<ChatMessage>, StoreError>;

    /// Current participant set.
    fn participants(&self, room_id: &str) -> Result<BTreeSet<String>, StoreError>;
}
