//! Room-scoped fan-out to live connections.
//!
//! Uses tokio broadcast channels for O(1) send to all subscribers.
//! Each connection gets an independent receiver that buffers up to
//! `capacity` frames before lagging receivers start dropping.
//!
//! Frames are pre-encoded once and shared via `Arc<String>` so a room
//! with N subscribers serializes each event exactly once. Scope-based
//! filtering (room vs. room-except-sender) happens at each receiving
//! connection, keyed by the originating connection id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use uuid::Uuid;

/// Delivery scope for one fanned-out frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutScope {
    /// Every subscribed connection, including the origin (echo-to-sender).
    Room,
    /// Every subscribed connection except the origin (typing signals).
    RoomExceptOrigin,
}

/// A pre-encoded frame travelling through a room's broadcast channel.
#[derive(Debug, Clone)]
pub struct Outbound {
    /// Connection that caused this frame.
    pub origin: Uuid,
    pub scope: FanoutScope,
    pub frame: Arc<String>,
}

impl Outbound {
    pub fn room(origin: Uuid, frame: String) -> Self {
        Self {
            origin,
            scope: FanoutScope::Room,
            frame: Arc::new(frame),
        }
    }

    pub fn room_except_origin(origin: Uuid, frame: String) -> Self {
        Self {
            origin,
            scope: FanoutScope::RoomExceptOrigin,
            frame: Arc::new(frame),
        }
    }

    /// Whether a subscriber with the given connection id should deliver
    /// this frame.
    pub fn delivers_to(&self, conn: Uuid) -> bool {
        match self.scope {
            FanoutScope::Room => true,
            FanoutScope::RoomExceptOrigin => self.origin != conn,
        }
    }
}

/// Statistics for monitoring fan-out health.
#[derive(Debug, Clone, Default)]
pub struct FanoutStats {
    pub frames_sent: u64,
    pub active_subscribers: usize,
}

/// A broadcast group for a single room.
///
/// All live connections joined to the same room share one channel.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Outbound>,

    /// Subscribed connections: connection id → account id
    subscribers: RwLock<HashMap<Uuid, String>>,

    /// Channel capacity (frames buffered per receiver)
    capacity: usize,

    /// Lock-free send counter
    frames_sent: AtomicU64,
}

impl BroadcastGroup {
    /// Create a new broadcast group with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscribers: RwLock::new(HashMap::new()),
            capacity,
            frames_sent: AtomicU64::new(0),
        }
    }

    /// Subscribe a connection for an account.
    ///
    /// Returns the receiver this connection consumes frames from.
    /// Re-subscribing the same connection (duplicate join) replaces the
    /// account entry and hands back a fresh receiver.
    pub async fn subscribe(&self, conn: Uuid, account_id: impl Into<String>) -> broadcast::Receiver<Outbound> {
        let mut subscribers = self.subscribers.write().await;
        subscribers.insert(conn, account_id.into());
        self.sender.subscribe()
    }

    /// Remove a connection's subscription.
    pub async fn unsubscribe(&self, conn: &Uuid) -> Option<String> {
        let mut subscribers = self.subscribers.write().await;
        subscribers.remove(conn)
    }

    /// Fan a frame out to all subscribed receivers.
    ///
    /// Returns the number of receivers the frame reached. Lock-free on
    /// the hot path.
    pub fn send(&self, outbound: Outbound) -> usize {
        let count = self.sender.send(outbound).unwrap_or(0);
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn is_subscribed(&self, conn: &Uuid) -> bool {
        self.subscribers.read().await.contains_key(conn)
    }

    /// Account ids with at least one live connection in this room.
    pub async fn online_accounts(&self) -> Vec<String> {
        self.subscribers.read().await.values().cloned().collect()
    }

    pub async fn stats(&self) -> FanoutStats {
        FanoutStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            active_subscribers: self.subscribers.read().await.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Live state for one room: its fan-out channel plus the serialization
/// gate ordering persistence against broadcast.
///
/// Two sends dispatched in sequence for the same room must append and
/// broadcast in that same sequence, and a clear racing a send must
/// resolve deterministically, so every persist-then-broadcast pair runs
/// while holding `gate`. Cross-room operations never contend.
pub struct LiveRoom {
    pub fanout: BroadcastGroup,
    pub gate: Mutex<()>,
}

impl LiveRoom {
    fn new(capacity: usize) -> Self {
        Self {
            fanout: BroadcastGroup::new(capacity),
            gate: Mutex::new(()),
        }
    }
}

/// Room manager: maps room ids to live rooms.
///
/// Each room gets its own broadcast group so that events are isolated
/// between conversations.
pub struct RoomManager {
    rooms: RwLock<HashMap<String, Arc<LiveRoom>>>,
    default_capacity: usize,
}

impl RoomManager {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            default_capacity,
        }
    }

    /// Get or create the live room for the given id.
    pub async fn get_or_create(&self, room_id: &str) -> Arc<LiveRoom> {
        // Fast path: read lock
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(room_id) {
                return room.clone();
            }
        }

        // Slow path: write lock to create
        let mut rooms = self.rooms.write().await;
        // Double-check after acquiring write lock
        if let Some(room) = rooms.get(room_id) {
            return room.clone();
        }

        let room = Arc::new(LiveRoom::new(self.default_capacity));
        rooms.insert(room_id.to_string(), room.clone());
        room
    }

    /// Look up a live room without creating it.
    pub async fn get(&self, room_id: &str) -> Option<Arc<LiveRoom>> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Remove a room that has no subscribers left.
    pub async fn remove_if_empty(&self, room_id: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(room_id) {
            if room.fanout.subscriber_count().await == 0 {
                rooms.remove(room_id);
                return true;
            }
        }
        false
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn active_rooms(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }
}
