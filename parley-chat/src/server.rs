//! WebSocket chat server with room-based event routing.
//!
//! Architecture:
//! ```text
//! Client A ──┐
//!             ├── LiveRoom (room_id) ── SessionGateway
//! Client B ──┘         │                    │
//!                      │                    ├── RoomStore (memory / RocksDB)
//!                      │                    │       ├── participants
//!                      │                    │       └── MessageLog
//!                      │                    │
//!                      └── BroadcastGroup ──┘
//!                           │
//!                 ┌─────────┼─────────┐
//!                 ▼         ▼         ▼
//!              Client A  Client B  Client A (second tab)
//! ```
//!
//! Each connection:
//! - carries one account (set by its first successful `join`)
//! - may be joined to many rooms at once, one per counterpart
//! - owns an outbox channel; a forward task per joined room moves
//!   frames from the room's broadcast channel into the outbox, applying
//!   scope filtering (typing excludes the origin connection)
//!
//! There is no leave event; leaving is implicit on disconnect and never
//! removes stored participants.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::broadcast::RoomManager;
use crate::gateway::{AccountDirectory, GatewayError, SessionGateway};
use crate::presence::PresenceFanout;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::storage::RoomStore;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Broadcast channel capacity per room
    pub broadcast_capacity: usize,
    /// Upper bound on any single storage call
    pub storage_timeout: Duration,
    /// Outbox frames buffered per connection
    pub outbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4000".to_string(),
            broadcast_capacity: 256,
            storage_timeout: Duration::from_secs(5),
            outbox_capacity: 256,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub active_rooms: usize,
}

/// The chat server.
pub struct ChatServer {
    config: ServerConfig,
    gateway: Arc<SessionGateway>,
    presence: Arc<PresenceFanout>,
    stats: Arc<RwLock<ServerStats>>,
}

impl ChatServer {
    /// Create a new server over the given store and account directory.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn RoomStore>,
        directory: Arc<dyn AccountDirectory>,
    ) -> Self {
        let rooms = Arc::new(RoomManager::new(config.broadcast_capacity));
        let gateway = Arc::new(SessionGateway::new(
            store,
            directory,
            rooms.clone(),
            config.storage_timeout,
        ));
        let presence = Arc::new(PresenceFanout::new(rooms));

        Self {
            config,
            gateway,
            presence,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Start listening for WebSocket connections.
    ///
    /// This runs the server event loop. Call from an async runtime.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Chat server listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let gateway = self.gateway.clone();
            let presence = self.presence.clone();
            let stats = self.stats.clone();
            let outbox_capacity = self.config.outbox_capacity;

            tokio::spawn(async move {
                if let Err(e) =
                    Self::handle_connection(stream, addr, gateway, presence, stats, outbox_capacity)
                        .await
                {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        gateway: Arc<SessionGateway>,
        presence: Arc<PresenceFanout>,
        stats: Arc<RwLock<ServerStats>>,
        outbox_capacity: usize,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let conn = Uuid::new_v4();
        log::info!("Connection {conn} established from {addr}");

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        // State for this connection
        let mut account_id: Option<String> = None;
        let mut joined: HashMap<String, tokio::task::JoinHandle<()>> = HashMap::new();

        // Outbox: every frame written to this socket flows through here,
        // from forward tasks and from direct responses alike
        let (out_tx, mut out_rx) = mpsc::channel::<Arc<String>>(outbox_capacity);

        loop {
            tokio::select! {
                // Outgoing frame ready for this connection
                frame = out_rx.recv() => {
                    match frame {
                        Some(frame) => {
                            ws_sender.send(Message::Text(frame.as_str().into())).await?;
                        }
                        None => break,
                    }
                }

                // Incoming WebSocket message
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let event = match ClientEvent::decode(text.as_str()) {
                                Ok(event) => event,
                                Err(e) => {
                                    log::warn!("Undecodable frame from {addr}: {e}");
                                    continue;
                                }
                            };

                            match event {
                                ClientEvent::Join { room_id, account } => {
                                    match gateway.join(&room_id, &account, conn).await {
                                        Ok((history, rx)) => {
                                            account_id = Some(account.id.clone());

                                            // One forward task per room; a
                                            // duplicate join only replays history
                                            if !joined.contains_key(&room_id) {
                                                let task = Self::forward_room(
                                                    rx,
                                                    out_tx.clone(),
                                                    conn,
                                                    room_id.clone(),
                                                );
                                                joined.insert(room_id.clone(), task);
                                            }

                                            let reply = ServerEvent::RoomHistory {
                                                room_id,
                                                history,
                                            };
                                            Self::send_frame(&out_tx, &reply).await;

                                            let mut s = stats.write().await;
                                            s.active_rooms = gateway.rooms().room_count().await;
                                        }
                                        Err(e) => Self::send_error(&out_tx, &e).await,
                                    }
                                }

                                ClientEvent::Message { room_id, msg } => {
                                    {
                                        let mut s = stats.write().await;
                                        s.total_messages += 1;
                                    }
                                    if let Err(e) = gateway.send(&room_id, msg, conn).await {
                                        Self::send_error(&out_tx, &e).await;
                                    }
                                }

                                ClientEvent::Typing { room_id, account_id: typist, value } => {
                                    presence.typing(&room_id, &typist, value, conn).await;
                                }

                                ClientEvent::Reaction {
                                    room_id,
                                    message_id,
                                    by_account_id,
                                    reaction,
                                } => {
                                    presence
                                        .reaction(&room_id, &message_id, &by_account_id, &reaction, conn)
                                        .await;
                                }

                                ClientEvent::MessageDelete {
                                    room_id,
                                    message_id,
                                    requester_id,
                                    for_everyone,
                                } => {
                                    if let Err(e) = gateway
                                        .delete_message(
                                            &room_id,
                                            &message_id,
                                            &requester_id,
                                            for_everyone,
                                            conn,
                                        )
                                        .await
                                    {
                                        Self::send_error(&out_tx, &e).await;
                                    }
                                }

                                ClientEvent::Clear { room_id } => {
                                    // The initiator is whoever this connection
                                    // authenticated as on join
                                    match account_id.as_deref() {
                                        Some(initiator) => {
                                            if let Err(e) =
                                                gateway.clear_room(&room_id, initiator, conn).await
                                            {
                                                Self::send_error(&out_tx, &e).await;
                                            }
                                        }
                                        None => {
                                            let e = GatewayError::NotAuthorized(
                                                "clear before join".to_string(),
                                            );
                                            Self::send_error(&out_tx, &e).await;
                                        }
                                    }
                                }
                            }
                        }

                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }

                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection {conn} closed from {addr}");
                            break;
                        }

                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }

                        _ => {}
                    }
                }
            }
        }

        // Cleanup: leaving is implicit, participants stay recorded
        for (room_id, task) in joined.drain() {
            task.abort();
            gateway.leave(&room_id, conn).await;
        }

        {
            let mut s = stats.write().await;
            s.active_connections -= 1;
            s.active_rooms = gateway.rooms().room_count().await;
        }

        Ok(())
    }

    /// Spawn the task that moves one room's broadcast frames into this
    /// connection's outbox, applying scope filtering.
    fn forward_room(
        mut rx: broadcast::Receiver<crate::broadcast::Outbound>,
        out_tx: mpsc::Sender<Arc<String>>,
        conn: Uuid,
        room_id: String,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(out) => {
                        if !out.delivers_to(conn) {
                            continue;
                        }
                        if out_tx.send(out.frame.clone()).await.is_err() {
                            break; // Connection gone
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("Connection {conn} lagged by {n} frames in room {room_id}");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Encode and enqueue a frame for this connection only.
    async fn send_frame(out_tx: &mpsc::Sender<Arc<String>>, event: &ServerEvent) {
        match event.encode() {
            Ok(frame) => {
                let _ = out_tx.send(Arc::new(frame)).await;
            }
            Err(e) => log::error!("Failed to encode frame: {e}"),
        }
    }

    /// Report an error to the originating connection; never broadcast.
    async fn send_error(out_tx: &mpsc::Sender<Arc<String>>, error: &GatewayError) {
        log::debug!("Reporting to origin: {error}");
        Self::send_frame(out_tx, &error.to_event()).await;
    }

    /// Get server statistics.
    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// Get the session gateway (for embedding and tests).
    pub fn gateway(&self) -> &Arc<SessionGateway> {
        &self.gateway
    }

    /// Get the presence fan-out.
    pub fn presence(&self) -> &Arc<PresenceFanout> {
        &self.presence
    }
}
