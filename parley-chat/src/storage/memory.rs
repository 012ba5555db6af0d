//! In-process room store backed by a `HashMap`.
//!
//! The default backend for tests and single-process deployments. All
//! contract semantics (idempotent creation, duplicate-append guard,
//! soft-delete marking) live in `RoomRecord`/`MessageLog`; this file is
//! only the map plumbing.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use crate::protocol::ChatMessage;
use crate::storage::{RoomRecord, RoomStore, StoreError};

/// In-memory `RoomStore`.
#[derive(Default)]
pub struct MemoryStore {
    rooms: RwLock<HashMap<String, RoomRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rooms currently stored.
    pub fn room_count(&self) -> usize {
        self.rooms.read().map(|rooms| rooms.len()).unwrap_or(0)
    }

    fn with_room<T>(
        &self,
        room_id: &str,
        f: impl FnOnce(&mut RoomRecord) -> T,
    ) -> Result<T, StoreError> {
        let mut rooms = self
            .rooms
            .write()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        let room = rooms
            .entry(room_id.to_string())
            .or_insert_with(|| RoomRecord::new(room_id));
        Ok(f(room))
    }
}

impl RoomStore for MemoryStore {
    fn get_or_create_room(&self, room_id: &str) -> Result<RoomRecord, StoreError> {
        self.with_room(room_id, |room| room.clone())
    }

    fn add_participant(&self, room_id: &str, account_id: &str) -> Result<(), StoreError> {
        self.with_room(room_id, |room| {
            room.participants.insert(account_id.to_string());
        })
    }

    fn append_message(&self, room_id: &str, message: ChatMessage) -> Result<bool, StoreError> {
        self.with_room(room_id, |room| room.log.append(message))
    }

    fn mark_deleted(
        &self,
        room_id: &str,
        message_id: &str,
        account_ids: &BTreeSet<String>,
    ) -> Result<bool, StoreError> {
        let mut rooms = self
            .rooms
            .write()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        Ok(rooms
            .get_mut(room_id)
            .is_some_and(|room| room.log.mark_deleted_for(message_id, account_ids)))
    }

    fn clear_messages(&self, room_id: &str) -> Result<(), StoreError> {
        let mut rooms = self
            .rooms
            .write()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        if let Some(room) = rooms.get_mut(room_id) {
            room.log.clear();
        }
        Ok(())
    }

    fn delete_room(&self, room_id: &str) -> Result<(), StoreError> {
        let mut rooms = self
            .rooms
            .write()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        rooms.remove(room_id);
        Ok(())
    }

    fn history(&self, room_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let rooms = self
            .rooms
            .read()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        Ok(rooms
            .get(room_id)
            .map(|room| room.log.history().to_vec())
            .unwrap_or_default())
    }

    fn participants(&self, room_id: &str) -> Result<BTreeSet<String>, StoreError> {
        let rooms = self
            .rooms
            .read()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        Ok(rooms
            .get(room_id)
            .map(|room| room.participants.clone())
            .unwrap_or_default())
    }
}
