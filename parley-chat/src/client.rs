//! WebSocket chat client for connecting to the chat server.
//!
//! Provides:
//! - Connection lifecycle (connect, disconnect)
//! - Join/send/typing/reaction/delete/clear senders
//! - An event channel for the embedding application
//! - Pending queue for messages composed while disconnected
//!
//! Echo handling: the server broadcasts a sent message back to the
//! sender's own connection. The client records the ids it sent and
//! suppresses those frames, reconciling its optimistic local append
//! instead of displaying the message twice.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, Mutex, RwLock};
use futures_util::StreamExt;
use uuid::Uuid;

use crate::protocol::{
    Account, ChatMessage, ClientEvent, FileRef, ProtocolError, ReplyRef, ServerEvent,
};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the chat client.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// Connection established
    Connected,
    /// Connection lost
    Disconnected,
    /// History replay after a join
    History {
        room_id: String,
        history: Vec<ChatMessage>,
    },
    /// A message arrived in a joined room
    Message { room_id: String, msg: ChatMessage },
    /// Counterpart typing state changed
    Typing { account_id: String, value: bool },
    /// A reaction was placed on a message
    Reaction {
        message_id: String,
        by_account_id: String,
        reaction: String,
    },
    /// A message was hidden for the listed accounts
    MessageDeleted {
        room_id: String,
        message_id: String,
        delete_for: Vec<String>,
    },
    /// A room's history was hard-cleared
    RoomCleared { room_id: String },
    /// The gateway rejected one of our operations
    ServerError { code: String, detail: String },
}

/// Queue for messages composed while disconnected.
///
/// Queued messages are replayed on connection; the server's duplicate-id
/// guard makes replay safe even if a send actually went through.
pub struct PendingQueue {
    queue: VecDeque<(String, ChatMessage)>,
    max_size: usize,
}

impl PendingQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_size.min(256)),
            max_size,
        }
    }

    /// Queue a message for later replay. Returns `false` when full.
    pub fn enqueue(&mut self, room_id: String, msg: ChatMessage) -> bool {
        if self.queue.len() >= self.max_size {
            return false;
        }
        self.queue.push_back((room_id, msg));
        true
    }

    /// Drain all queued messages for replay.
    pub fn drain(&mut self) -> Vec<(String, ChatMessage)> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

/// The chat client.
pub struct ChatClient {
    /// Who we are, as registered with the account service
    account: Account,

    /// Connection state
    state: Arc<RwLock<ConnectionState>>,

    /// Messages composed while disconnected
    pending: Arc<Mutex<PendingQueue>>,

    /// Ids of messages we sent, for echo suppression
    sent_ids: Arc<Mutex<HashSet<String>>>,

    /// Channel to the WebSocket writer task
    outgoing_tx: Option<mpsc::Sender<String>>,

    /// Event receiver for the application
    event_rx: Option<mpsc::Receiver<ChatEvent>>,

    /// Event sender (held by the reader task)
    event_tx: mpsc::Sender<ChatEvent>,

    /// Server URL
    server_url: String,
}

impl ChatClient {
    /// Create a new chat client.
    pub fn new(account: Account, server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            account,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            pending: Arc::new(Mutex::new(PendingQueue::new(1_000))),
            sent_ids: Arc::new(Mutex::new(HashSet::new())),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
            server_url: server_url.into(),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<ChatEvent>> {
        self.event_rx.take()
    }

    /// Connect to the server.
    ///
    /// Spawns background tasks for reading/writing WebSocket frames and
    /// replays any pending messages.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let ws_result = tokio_tungstenite::connect_async(&self.server_url).await;
        let (ws_stream, _) = match ws_result {
            Ok(ok) => ok,
            Err(_) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ProtocolError::ConnectionClosed);
            }
        };

        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward outgoing channel to the WebSocket
        let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
        self.outgoing_tx = Some(out_tx);
        tokio::spawn(async move {
            use futures_util::SinkExt;
            while let Some(frame) = out_rx.recv().await {
                if ws_writer
                    .send(tokio_tungstenite::tungstenite::Message::Text(frame.into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(ChatEvent::Connected).await;

        // Replay messages composed while disconnected
        {
            let mut pending = self.pending.lock().await;
            let queued = pending.drain();
            if !queued.is_empty() {
                log::info!("Replaying {} pending messages", queued.len());
                for (room_id, msg) in queued {
                    let event = ClientEvent::Message { room_id, msg };
                    if let Ok(encoded) = event.encode() {
                        if let Some(ref tx) = self.outgoing_tx {
                            let _ = tx.send(encoded).await;
                        }
                    }
                }
            }
        }

        // Reader task: decode incoming frames into events
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        let sent_ids = self.sent_ids.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(tokio_tungstenite::tungstenite::Message::Text(text)) => {
                        let server_event = match ServerEvent::decode(text.as_str()) {
                            Ok(event) => event,
                            Err(e) => {
                                log::warn!("Undecodable frame from server: {e}");
                                continue;
                            }
                        };

                        let event = match server_event {
                            ServerEvent::RoomHistory { room_id, history } => {
                                Some(ChatEvent::History { room_id, history })
                            }
                            ServerEvent::Message { room_id, msg } => {
                                // Suppress the echo of our own sends. Each id
                                // is echoed at most once, so the entry can go.
                                if sent_ids.lock().await.remove(&msg.id) {
                                    None
                                } else {
                                    Some(ChatEvent::Message { room_id, msg })
                                }
                            }
                            ServerEvent::Typing { account_id, value } => {
                                Some(ChatEvent::Typing { account_id, value })
                            }
                            ServerEvent::Reaction {
                                message_id,
                                by_account_id,
                                reaction,
                            } => Some(ChatEvent::Reaction {
                                message_id,
                                by_account_id,
                                reaction,
                            }),
                            ServerEvent::MessageDeleted {
                                room_id,
                                message_id,
                                delete_for,
                            } => Some(ChatEvent::MessageDeleted {
                                room_id,
                                message_id,
                                delete_for,
                            }),
                            ServerEvent::RoomCleared { room_id } => {
                                Some(ChatEvent::RoomCleared { room_id })
                            }
                            ServerEvent::Error { code, detail } => {
                                Some(ChatEvent::ServerError { code, detail })
                            }
                        };

                        if let Some(event) = event {
                            let _ = event_tx.send(event).await;
                        }
                    }
                    Ok(tokio_tungstenite::tungstenite::Message::Close(_)) | Err(_) => {
                        break;
                    }
                    _ => {}
                }
            }

            // Connection lost
            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(ChatEvent::Disconnected).await;
        });

        Ok(())
    }

    /// Join a room, requesting history replay.
    pub async fn join(&self, room_id: impl Into<String>) -> Result<(), ProtocolError> {
        let event = ClientEvent::Join {
            room_id: room_id.into(),
            account: self.account.clone(),
        };
        self.send_event(&event).await
    }

    /// Send a text message. Returns the generated message id.
    ///
    /// While disconnected the message is queued and replayed on connect.
    pub async fn send_text(
        &self,
        room_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<String, ProtocolError> {
        let msg = ChatMessage::text(
            Uuid::new_v4().to_string(),
            &self.account.id,
            &self.account.name,
            text,
            now_millis(),
        );
        self.send_message(room_id.into(), msg).await
    }

    /// Send a text message replying to another message.
    ///
    /// The reply carries a snapshot of the original, so it renders even
    /// if the original is later deleted.
    pub async fn send_reply(
        &self,
        room_id: impl Into<String>,
        text: impl Into<String>,
        reply: ReplyRef,
    ) -> Result<String, ProtocolError> {
        let msg = ChatMessage::text(
            Uuid::new_v4().to_string(),
            &self.account.id,
            &self.account.name,
            text,
            now_millis(),
        )
        .with_reply(reply);
        self.send_message(room_id.into(), msg).await
    }

    /// Send a file reference message.
    pub async fn send_file(
        &self,
        room_id: impl Into<String>,
        file: FileRef,
    ) -> Result<String, ProtocolError> {
        let msg = ChatMessage::file(
            Uuid::new_v4().to_string(),
            &self.account.id,
            &self.account.name,
            file,
            now_millis(),
        );
        self.send_message(room_id.into(), msg).await
    }

    async fn send_message(
        &self,
        room_id: String,
        msg: ChatMessage,
    ) -> Result<String, ProtocolError> {
        let id = msg.id.clone();
        self.sent_ids.lock().await.insert(id.clone());

        let state = *self.state.read().await;
        if state != ConnectionState::Connected {
            // Queue for replay; the duplicate-id guard makes this safe
            let mut pending = self.pending.lock().await;
            if !pending.enqueue(room_id, msg) {
                return Err(ProtocolError::ConnectionClosed);
            }
            return Ok(id);
        }

        let event = ClientEvent::Message { room_id, msg };
        self.send_event(&event).await?;
        Ok(id)
    }

    /// Send a typing indicator. Silently dropped while offline.
    pub async fn typing(
        &self,
        room_id: impl Into<String>,
        value: bool,
    ) -> Result<(), ProtocolError> {
        let state = *self.state.read().await;
        if state != ConnectionState::Connected {
            return Ok(());
        }
        let event = ClientEvent::Typing {
            room_id: room_id.into(),
            account_id: self.account.id.clone(),
            value,
        };
        self.send_event(&event).await
    }

    /// React to a message.
    pub async fn react(
        &self,
        room_id: impl Into<String>,
        message_id: impl Into<String>,
        reaction: impl Into<String>,
    ) -> Result<(), ProtocolError> {
        let event = ClientEvent::Reaction {
            room_id: room_id.into(),
            message_id: message_id.into(),
            by_account_id: self.account.id.clone(),
            reaction: reaction.into(),
        };
        self.send_event(&event).await
    }

    /// Delete a message for ourselves or, as its author, for everyone.
    pub async fn delete_message(
        &self,
        room_id: impl Into<String>,
        message_id: impl Into<String>,
        for_everyone: bool,
    ) -> Result<(), ProtocolError> {
        let event = ClientEvent::MessageDelete {
            room_id: room_id.into(),
            message_id: message_id.into(),
            requester_id: self.account.id.clone(),
            for_everyone,
        };
        self.send_event(&event).await
    }

    /// Hard-clear a room's history.
    pub async fn clear(&self, room_id: impl Into<String>) -> Result<(), ProtocolError> {
        let event = ClientEvent::Clear {
            room_id: room_id.into(),
        };
        self.send_event(&event).await
    }

    async fn send_event(&self, event: &ClientEvent) -> Result<(), ProtocolError> {
        let encoded = event.encode()?;
        match &self.outgoing_tx {
            Some(tx) => tx
                .send(encoded)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Get the current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Get our account.
    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Get the server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Number of messages queued while disconnected.
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// The history as one account should see it: soft-deleted entries
    /// filtered out.
    pub fn visible_history<'a>(
        history: &'a [ChatMessage],
        account_id: &str,
    ) -> Vec<&'a ChatMessage> {
        history
            .iter()
            .filter(|m| !m.is_deleted_for(account_id))
            .collect()
    }
}

/// Milliseconds since the Unix epoch, for message timestamps.
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
