//! Session gateway: bridges persistent room state to live subscriptions.
//!
//! Every inbound event (join, send, delete, clear) is an independent
//! unit of work. Operations on the same room serialize through that
//! room's gate so persistence order and broadcast order always agree;
//! operations on different rooms proceed in parallel. Storage calls run
//! off the async reactor and are bounded by `storage_timeout` — a stuck
//! backend surfaces `StorageUnavailable` instead of starving the room.
//!
//! Echo policy: a sent message is broadcast to every subscribed
//! connection in the room, including the sender's own connections.
//! Clients reconcile their optimistic local append by message id.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::broadcast::{FanoutScope, LiveRoom, Outbound, RoomManager};
use crate::protocol::{Account, ChatMessage, FileRef, ServerEvent};
use crate::storage::{RoomStore, StoreError};

/// Read-only view of the external account/approval workflow.
///
/// The gateway never owns account state; it only asks whether an account
/// may participate, and resolves opaque upload tokens into file
/// references.
pub trait AccountDirectory: Send + Sync {
    /// Whether this account may join rooms and exchange messages
    /// (derived from account status/role upstream).
    fn is_participant_authorized(&self, account_id: &str) -> bool;

    /// Resolve an upload token into a file reference, if the external
    /// file service knows it.
    fn resolve_file_reference(&self, upload_token: &str) -> Option<FileRef>;
}

/// Directory that authorizes everyone and resolves nothing.
///
/// For tests and standalone deployments without an account service.
pub struct OpenDirectory;

impl AccountDirectory for OpenDirectory {
    fn is_participant_authorized(&self, _account_id: &str) -> bool {
        true
    }

    fn resolve_file_reference(&self, _upload_token: &str) -> Option<FileRef> {
        None
    }
}

/// Gateway errors, reported only to the originating connection.
///
/// Duplicate sends are not in this taxonomy: they are absorbed by the
/// append guard and treated as already delivered.
#[derive(Debug, Clone)]
pub enum GatewayError {
    /// Malformed room derivation input.
    InvalidParticipants(String),
    /// Message carries neither text nor a file reference.
    InvalidMessage,
    /// Non-participant operating on a room, or non-author deleting for
    /// everyone.
    NotAuthorized(String),
    /// Unknown message id.
    NotFound(String),
    /// Persistence failed or timed out. Not retried by the gateway;
    /// clients own retry, and the duplicate-id guard makes retry safe.
    StorageUnavailable(String),
}

impl GatewayError {
    /// Stable code carried on `error` frames.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::InvalidParticipants(_) => "invalid_participants",
            GatewayError::InvalidMessage => "invalid_message",
            GatewayError::NotAuthorized(_) => "not_authorized",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::StorageUnavailable(_) => "storage_unavailable",
        }
    }

    /// Render as the `error` frame sent to the originating connection.
    pub fn to_event(&self) -> ServerEvent {
        ServerEvent::Error {
            code: self.code().to_string(),
            detail: self.to_string(),
        }
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::InvalidParticipants(detail) => {
                write!(f, "invalid participants: {detail}")
            }
            GatewayError::InvalidMessage => {
                write!(f, "message has neither text nor file content")
            }
            GatewayError::NotAuthorized(detail) => write!(f, "not authorized: {detail}"),
            GatewayError::NotFound(detail) => write!(f, "not found: {detail}"),
            GatewayError::StorageUnavailable(detail) => {
                write!(f, "storage unavailable: {detail}")
            }
        }
    }
}

impl std::error::Error for GatewayError {}

/// The session gateway.
pub struct SessionGateway {
    store: Arc<dyn RoomStore>,
    directory: Arc<dyn AccountDirectory>,
    rooms: Arc<RoomManager>,
    storage_timeout: Duration,
}

impl SessionGateway {
    pub fn new(
        store: Arc<dyn RoomStore>,
        directory: Arc<dyn AccountDirectory>,
        rooms: Arc<RoomManager>,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            store,
            directory,
            rooms,
            storage_timeout,
        }
    }

    /// The live-room map shared with the presence fan-out.
    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.rooms
    }

    /// Resolve an upload token into a file reference via the external
    /// file service. The core stores and delivers the reference opaquely.
    pub fn resolve_file(&self, upload_token: &str) -> Option<FileRef> {
        self.directory.resolve_file_reference(upload_token)
    }

    /// Join a connection to a room.
    ///
    /// Ensures the room exists, records the account as a participant,
    /// subscribes the connection to the room's live channel, and returns
    /// the full stored history for client-side replay. Safe to call
    /// repeatedly for the same account/room pair: participants never
    /// duplicate, and each call returns the history as stored at that
    /// moment.
    pub async fn join(
        &self,
        room_id: &str,
        account: &Account,
        conn: Uuid,
    ) -> Result<(Vec<ChatMessage>, broadcast::Receiver<Outbound>), GatewayError> {
        if room_id.is_empty() || account.id.is_empty() {
            return Err(GatewayError::InvalidParticipants(
                "empty room or account id".to_string(),
            ));
        }
        if !self.directory.is_participant_authorized(&account.id) {
            return Err(GatewayError::NotAuthorized(format!(
                "account {} is not approved for messaging",
                account.id
            )));
        }

        let live = self.rooms.get_or_create(room_id).await;
        let _gate = live.gate.lock().await;

        let rid = room_id.to_string();
        let account_id = account.id.clone();
        let history = self
            .with_store(move |store| {
                store.get_or_create_room(&rid)?;
                store.add_participant(&rid, &account_id)?;
                store.history(&rid)
            })
            .await?;

        let rx = live.fanout.subscribe(conn, &account.id).await;
        log::info!(
            "Account {} joined room {room_id} ({} stored messages)",
            account.id,
            history.len()
        );
        Ok((history, rx))
    }

    /// Persist a message and fan it out to the room.
    ///
    /// Returns `Ok(false)` when the message id was already in the log:
    /// the duplicate is absorbed, nothing is re-broadcast, and the
    /// client may treat the message as delivered.
    pub async fn send(
        &self,
        room_id: &str,
        msg: ChatMessage,
        conn: Uuid,
    ) -> Result<bool, GatewayError> {
        if !msg.has_content() {
            return Err(GatewayError::InvalidMessage);
        }

        let live = self.rooms.get_or_create(room_id).await;
        let _gate = live.gate.lock().await;

        let rid = room_id.to_string();
        let participants = self
            .with_store(move |store| {
                store.get_or_create_room(&rid)?;
                store.participants(&rid)
            })
            .await?;
        if !participants.contains(&msg.from) {
            return Err(GatewayError::NotAuthorized(format!(
                "account {} is not a participant of room {room_id}",
                msg.from
            )));
        }

        let event = ServerEvent::Message {
            room_id: room_id.to_string(),
            msg: msg.clone(),
        };

        let rid = room_id.to_string();
        let appended = self
            .with_store(move |store| store.append_message(&rid, msg))
            .await?;
        if !appended {
            log::debug!("Duplicate message absorbed in room {room_id}");
            return Ok(false);
        }

        Self::fan_out(&live, &event, conn, FanoutScope::Room);
        Ok(true)
    }

    /// Mark a message deleted and broadcast the affected accounts.
    ///
    /// "For everyone" is only permitted for the message author and hides
    /// the message from the room's full current participant set; "for
    /// self" adds only the requester. Returns the accounts the deletion
    /// applies to.
    pub async fn delete_message(
        &self,
        room_id: &str,
        message_id: &str,
        requester_id: &str,
        for_everyone: bool,
        conn: Uuid,
    ) -> Result<Vec<String>, GatewayError> {
        let live = self.rooms.get_or_create(room_id).await;
        let _gate = live.gate.lock().await;

        let rid = room_id.to_string();
        let mid = message_id.to_string();
        let (participants, author) = self
            .with_store(move |store| {
                let participants = store.participants(&rid)?;
                let author = store
                    .history(&rid)?
                    .iter()
                    .find(|m| m.id == mid)
                    .map(|m| m.from.clone());
                Ok((participants, author))
            })
            .await?;

        if !participants.contains(requester_id) {
            return Err(GatewayError::NotAuthorized(format!(
                "account {requester_id} is not a participant of room {room_id}"
            )));
        }
        let Some(author) = author else {
            return Err(GatewayError::NotFound(format!(
                "message {message_id} in room {room_id}"
            )));
        };
        if for_everyone && author != requester_id {
            return Err(GatewayError::NotAuthorized(
                "only the author may delete for everyone".to_string(),
            ));
        }

        let delete_for: BTreeSet<String> = if for_everyone {
            participants
        } else {
            BTreeSet::from([requester_id.to_string()])
        };

        let rid = room_id.to_string();
        let mid = message_id.to_string();
        let targets = delete_for.clone();
        let marked = self
            .with_store(move |store| store.mark_deleted(&rid, &mid, &targets))
            .await?;
        if !marked {
            // The log was cleared between lookup and mark
            return Err(GatewayError::NotFound(format!(
                "message {message_id} in room {room_id}"
            )));
        }

        let delete_for: Vec<String> = delete_for.into_iter().collect();
        let event = ServerEvent::MessageDeleted {
            room_id: room_id.to_string(),
            message_id: message_id.to_string(),
            delete_for: delete_for.clone(),
        };
        Self::fan_out(&live, &event, conn, FanoutScope::Room);
        Ok(delete_for)
    }

    /// Hard-clear a room's history and broadcast `room:cleared`.
    ///
    /// Role gating happens upstream; the gateway still verifies the
    /// initiator is a participant.
    pub async fn clear_room(
        &self,
        room_id: &str,
        initiator_id: &str,
        conn: Uuid,
    ) -> Result<(), GatewayError> {
        let live = self.rooms.get_or_create(room_id).await;
        let _gate = live.gate.lock().await;

        let rid = room_id.to_string();
        let participants = self
            .with_store(move |store| store.participants(&rid))
            .await?;
        if !participants.contains(initiator_id) {
            return Err(GatewayError::NotAuthorized(format!(
                "account {initiator_id} is not a participant of room {room_id}"
            )));
        }

        let rid = room_id.to_string();
        self.with_store(move |store| store.clear_messages(&rid))
            .await?;
        log::info!("Room {room_id} cleared by {initiator_id}");

        let event = ServerEvent::RoomCleared {
            room_id: room_id.to_string(),
        };
        Self::fan_out(&live, &event, conn, FanoutScope::Room);
        Ok(())
    }

    /// Remove a room entirely: membership and log.
    ///
    /// For the external account workflow (account removal, admin purge).
    /// Nothing is broadcast; affected clients learn through the account
    /// service.
    pub async fn purge_room(&self, room_id: &str) -> Result<(), GatewayError> {
        let live = self.rooms.get(room_id).await;
        let _gate = match live.as_ref() {
            Some(room) => Some(room.gate.lock().await),
            None => None,
        };

        let rid = room_id.to_string();
        self.with_store(move |store| store.delete_room(&rid))
            .await?;

        drop(_gate);
        self.rooms.remove_if_empty(room_id).await;
        log::info!("Room {room_id} purged");
        Ok(())
    }

    /// Drop a connection's subscription to a room.
    ///
    /// Leaving is implicit (disconnect only) and never removes the
    /// account from the room's stored participants.
    pub async fn leave(&self, room_id: &str, conn: Uuid) {
        if let Some(live) = self.rooms.get(room_id).await {
            live.fanout.unsubscribe(&conn).await;
            self.rooms.remove_if_empty(room_id).await;
        }
    }

    /// Encode once, fan out, absorb encode failures with a log line.
    fn fan_out(live: &LiveRoom, event: &ServerEvent, origin: Uuid, scope: FanoutScope) -> usize {
        match event.encode() {
            Ok(frame) => live.fanout.send(Outbound {
                origin,
                scope,
                frame: Arc::new(frame),
            }),
            Err(e) => {
                log::error!("Failed to encode fan-out frame: {e}");
                0
            }
        }
    }

    /// Run a storage operation off the reactor, bounded by the
    /// configured timeout.
    async fn with_store<T, F>(&self, op: F) -> Result<T, GatewayError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RoomStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || op(store.as_ref()));
        match tokio::time::timeout(self.storage_timeout, task).await {
            Ok(Ok(result)) => result.map_err(|e| {
                log::error!("Storage operation failed: {e}");
                GatewayError::StorageUnavailable(e.to_string())
            }),
            Ok(Err(join_err)) => Err(GatewayError::StorageUnavailable(join_err.to_string())),
            Err(_) => Err(GatewayError::StorageUnavailable(
                "storage operation timed out".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use tokio::time::timeout;

    fn gateway() -> SessionGateway {
        SessionGateway::new(
            Arc::new(MemoryStore::new()),
            Arc::new(OpenDirectory),
            Arc::new(RoomManager::new(64)),
            Duration::from_secs(2),
        )
    }

    fn msg(id: &str, from: &str, text: &str) -> ChatMessage {
        ChatMessage::text(id, from, from.to_uppercase(), text, 0)
    }

    async fn joined_pair(
        gw: &SessionGateway,
    ) -> (
        Uuid,
        Uuid,
        broadcast::Receiver<Outbound>,
        broadcast::Receiver<Outbound>,
    ) {
        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();
        let (_, rx_a) = gw.join("a--b", &Account::new("a", "Alice"), conn_a).await.unwrap();
        let (_, rx_b) = gw.join("a--b", &Account::new("b", "Bob"), conn_b).await.unwrap();
        (conn_a, conn_b, rx_a, rx_b)
    }

    #[tokio::test]
    async fn test_join_empty_history() {
        let gw = gateway();
        let (history, _rx) = gw
            .join("a--b", &Account::new("a", "Alice"), Uuid::new_v4())
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_rejoin_is_idempotent() {
        let gw = gateway();
        let account = Account::new("a", "Alice");

        let conn = Uuid::new_v4();
        gw.join("a--b", &account, conn).await.unwrap();
        gw.join("a--b", &account, conn).await.unwrap();

        let room = gw
            .with_store(|s| s.participants("a--b"))
            .await
            .unwrap();
        assert_eq!(room.len(), 1);
        let live = gw.rooms().get("a--b").await.unwrap();
        assert_eq!(live.fanout.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn test_send_broadcasts_to_both_including_sender() {
        let gw = gateway();
        let (conn_a, _conn_b, mut rx_a, mut rx_b) = joined_pair(&gw).await;

        assert!(gw.send("a--b", msg("m1", "a", "hi"), conn_a).await.unwrap());

        // Echo policy: the sender's connection receives its own message
        for rx in [&mut rx_a, &mut rx_b] {
            let out = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
            assert!(out.delivers_to(conn_a));
            let event = ServerEvent::decode(&out.frame).unwrap();
            match event {
                ServerEvent::Message { msg, .. } => assert_eq!(msg.id, "m1"),
                other => panic!("expected message event, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_send_by_non_participant_rejected() {
        let gw = gateway();
        let (conn_a, _conn_b, _rx_a, mut rx_b) = joined_pair(&gw).await;

        let err = gw
            .send("a--b", msg("m1", "c", "intruding"), conn_a)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_authorized");

        // No broadcast happened
        let result = timeout(Duration::from_millis(100), rx_b.recv()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_send_absorbed() {
        let gw = gateway();
        let (conn_a, _conn_b, _rx_a, mut rx_b) = joined_pair(&gw).await;

        assert!(gw.send("a--b", msg("m1", "a", "hi"), conn_a).await.unwrap());
        assert!(!gw.send("a--b", msg("m1", "a", "hi"), conn_a).await.unwrap());

        let history = gw.with_store(|s| s.history("a--b")).await.unwrap();
        assert_eq!(history.len(), 1);

        // Exactly one broadcast reached subscribers
        let _ = timeout(Duration::from_secs(1), rx_b.recv()).await.unwrap();
        assert!(timeout(Duration::from_millis(100), rx_b.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_sequential_sends_keep_order() {
        let gw = gateway();
        let (conn_a, conn_b, _rx_a, _rx_b) = joined_pair(&gw).await;

        gw.send("a--b", msg("m1", "a", "first"), conn_a).await.unwrap();
        gw.send("a--b", msg("m2", "b", "second"), conn_b).await.unwrap();

        let history = gw.with_store(|s| s.history("a--b")).await.unwrap();
        let ids: Vec<&str> = history.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_malformed_message_rejected() {
        let gw = gateway();
        let (conn_a, _conn_b, _rx_a, _rx_b) = joined_pair(&gw).await;

        let mut empty = msg("m1", "a", "");
        empty.text = None;
        let err = gw.send("a--b", empty, conn_a).await.unwrap_err();
        assert_eq!(err.code(), "invalid_message");
    }

    #[tokio::test]
    async fn test_delete_for_self() {
        let gw = gateway();
        let (conn_a, conn_b, _rx_a, _rx_b) = joined_pair(&gw).await;
        gw.send("a--b", msg("m1", "a", "hi"), conn_a).await.unwrap();

        // Any participant may delete for self, author or not
        let delete_for = gw
            .delete_message("a--b", "m1", "b", false, conn_b)
            .await
            .unwrap();
        assert_eq!(delete_for, vec!["b".to_string()]);

        let history = gw.with_store(|s| s.history("a--b")).await.unwrap();
        assert!(history[0].is_deleted_for("b"));
        assert!(!history[0].is_deleted_for("a"));
    }

    #[tokio::test]
    async fn test_delete_for_everyone_author_only() {
        let gw = gateway();
        let (conn_a, conn_b, _rx_a, _rx_b) = joined_pair(&gw).await;
        gw.send("a--b", msg("m1", "a", "hi"), conn_a).await.unwrap();

        let err = gw
            .delete_message("a--b", "m1", "b", true, conn_b)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_authorized");

        let mut delete_for = gw
            .delete_message("a--b", "m1", "a", true, conn_a)
            .await
            .unwrap();
        delete_for.sort();
        assert_eq!(delete_for, vec!["a".to_string(), "b".to_string()]);

        let history = gw.with_store(|s| s.history("a--b")).await.unwrap();
        assert!(history[0].is_deleted_for("a"));
        assert!(history[0].is_deleted_for("b"));
    }

    #[tokio::test]
    async fn test_delete_unknown_message() {
        let gw = gateway();
        let (conn_a, _conn_b, _rx_a, _rx_b) = joined_pair(&gw).await;

        let err = gw
            .delete_message("a--b", "missing", "a", false, conn_a)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn test_clear_then_send_succeeds() {
        let gw = gateway();
        let (conn_a, _conn_b, _rx_a, mut rx_b) = joined_pair(&gw).await;
        gw.send("a--b", msg("m1", "a", "hi"), conn_a).await.unwrap();

        gw.clear_room("a--b", "a", conn_a).await.unwrap();
        let history = gw.with_store(|s| s.history("a--b")).await.unwrap();
        assert!(history.is_empty());

        // Subscribers saw message + cleared; the room keeps working
        let _ = timeout(Duration::from_secs(1), rx_b.recv()).await.unwrap();
        let out = timeout(Duration::from_secs(1), rx_b.recv()).await.unwrap().unwrap();
        assert!(matches!(
            ServerEvent::decode(&out.frame).unwrap(),
            ServerEvent::RoomCleared { .. }
        ));

        gw.send("a--b", msg("m2", "a", "after clear"), conn_a).await.unwrap();
        let history = gw.with_store(|s| s.history("a--b")).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, "m2");
    }

    #[tokio::test]
    async fn test_clear_by_non_participant_rejected() {
        let gw = gateway();
        let (conn_a, _conn_b, _rx_a, _rx_b) = joined_pair(&gw).await;

        let err = gw.clear_room("a--b", "c", conn_a).await.unwrap_err();
        assert_eq!(err.code(), "not_authorized");
    }

    #[tokio::test]
    async fn test_purge_room() {
        let gw = gateway();
        let (conn_a, _conn_b, _rx_a, _rx_b) = joined_pair(&gw).await;
        gw.send("a--b", msg("m1", "a", "hi"), conn_a).await.unwrap();

        gw.purge_room("a--b").await.unwrap();
        let participants = gw.with_store(|s| s.participants("a--b")).await.unwrap();
        assert!(participants.is_empty());
        let history = gw.with_store(|s| s.history("a--b")).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_unapproved_account_cannot_join() {
        struct DenyAll;
        impl AccountDirectory for DenyAll {
            fn is_participant_authorized(&self, _: &str) -> bool {
                false
            }
            fn resolve_file_reference(&self, _: &str) -> Option<FileRef> {
                None
            }
        }

        let gw = SessionGateway::new(
            Arc::new(MemoryStore::new()),
            Arc::new(DenyAll),
            Arc::new(RoomManager::new(64)),
            Duration::from_secs(2),
        );

        let err = gw
            .join("a--b", &Account::new("a", "Alice"), Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_authorized");
    }

    #[tokio::test]
    async fn test_stuck_storage_surfaces_unavailable() {
        struct StuckStore;
        impl RoomStore for StuckStore {
            fn get_or_create_room(
                &self,
                _: &str,
            ) -> Result<crate::storage::RoomRecord, StoreError> {
                std::thread::sleep(Duration::from_secs(5));
                Ok(crate::storage::RoomRecord::new("a--b"))
            }
            fn add_participant(&self, _: &str, _: &str) -> Result<(), StoreError> {
                Ok(())
            }
            fn append_message(&self, _: &str, _: ChatMessage) -> Result<bool, StoreError> {
                Ok(true)
            }
            fn mark_deleted(
                &self,
                _: &str,
                _: &str,
                _: &BTreeSet<String>,
            ) -> Result<bool, StoreError> {
                Ok(true)
            }
            fn clear_messages(&self, _: &str) -> Result<(), StoreError> {
                Ok(())
            }
            fn delete_room(&self, _: &str) -> Result<(), StoreError> {
                Ok(())
            }
            fn history(&self, _: &str) -> Result<Vec<ChatMessage>, StoreError> {
                Ok(Vec::new())
            }
            fn participants(&self, _: &str) -> Result<BTreeSet<String>, StoreError> {
                Ok(BTreeSet::new())
            }
        }

        let gw = SessionGateway::new(
            Arc::new(StuckStore),
            Arc::new(OpenDirectory),
            Arc::new(RoomManager::new(64)),
            Duration::from_millis(100),
        );

        let err = gw
            .join("a--b", &Account::new("a", "Alice"), Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "storage_unavailable");
    }

    #[tokio::test]
    async fn test_file_message_flow() {
        struct FixedFiles;
        impl AccountDirectory for FixedFiles {
            fn is_participant_authorized(&self, _: &str) -> bool {
                true
            }
            fn resolve_file_reference(&self, upload_token: &str) -> Option<FileRef> {
                (upload_token == "tok-1").then(|| FileRef {
                    file_name: "notes.txt".to_string(),
                    file_size: 321,
                    file_url: "https://files.example/notes.txt".to_string(),
                })
            }
        }

        let gw = SessionGateway::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FixedFiles),
            Arc::new(RoomManager::new(64)),
            Duration::from_secs(2),
        );

        let conn = Uuid::new_v4();
        gw.join("a--b", &Account::new("a", "Alice"), conn).await.unwrap();

        assert!(gw.resolve_file("unknown").is_none());
        let file = gw.resolve_file("tok-1").unwrap();
        let msg = ChatMessage::file("m1", "a", "Alice", file, 0);
        assert!(gw.send("a--b", msg, conn).await.unwrap());

        let history = gw.with_store(|s| s.history("a--b")).await.unwrap();
        assert_eq!(history[0].file.as_ref().unwrap().file_name, "notes.txt");
        assert!(history[0].text.is_none());
    }

    #[tokio::test]
    async fn test_cross_room_sends_independent() {
        let gw = gateway();
        let conn_a = Uuid::new_v4();
        let conn_c = Uuid::new_v4();
        gw.join("a--b", &Account::new("a", "Alice"), conn_a).await.unwrap();
        gw.join("a--c", &Account::new("c", "Cleo"), conn_c).await.unwrap();

        gw.send("a--b", msg("m1", "a", "to b"), conn_a).await.unwrap();
        gw.send("a--c", msg("m2", "c", "to a"), conn_c).await.unwrap();

        assert_eq!(gw.with_store(|s| s.history("a--b")).await.unwrap().len(), 1);
        assert_eq!(gw.with_store(|s| s.history("a--c")).await.unwrap().len(), 1);
    }
}
