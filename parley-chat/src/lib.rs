//! # parley-chat — real-time 1:1 messaging core
//!
//! Messaging session and delivery subsystem for an admin/user support
//! chat: deterministic room identity, join handshake with history
//! replay, persisted message logs with soft-delete, live room broadcast,
//! and ephemeral presence signals.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket       ┌─────────────┐
//! │ ChatClient  │ ◄─────────────────► │ ChatServer  │
//! │ (per user)  │     JSON events     │ (central)   │
//! └─────────────┘                     └──────┬──────┘
//!                                            │
//!                                     ┌──────┴────────┐
//!                                     │SessionGateway │
//!                                     │ per-room gate │
//!                                     └──┬─────────┬──┘
//!                                        │         │
//!                              ┌─────────┴──┐   ┌──┴───────────┐
//!                              │ RoomStore  │   │BroadcastGroup│
//!                              │ (trait)    │   │ (fan-out)    │
//!                              └────────────┘   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`room`] — canonical room id derivation for account pairs
//! - [`protocol`] — JSON event contract and message types
//! - [`history`] — append-only message log with soft-delete marking
//! - [`storage`] — room persistence (in-memory and RocksDB backends)
//! - [`broadcast`] — room-scoped fan-out with per-room serialization
//! - [`gateway`] — join/send/delete/clear operations and authorization
//! - [`presence`] — typing and reaction signals, never persisted
//! - [`server`] — WebSocket accept loop and connection handling
//! - [`client`] — WebSocket chat client with echo suppression
//!
//! ## Guarantees
//!
//! | Property | Mechanism |
//! |----------|-----------|
//! | Per-room append/broadcast order | per-room async gate |
//! | At-most-once append per id | duplicate-id guard in the log |
//! | Deletion is a view filter | `deleted_for` sets, full log retained |
//! | Stuck storage never starves a room | bounded storage timeout |

pub mod broadcast;
pub mod client;
pub mod gateway;
pub mod history;
pub mod presence;
pub mod protocol;
pub mod room;
pub mod server;
pub mod storage;

// Re-exports for convenience
pub use broadcast::{BroadcastGroup, FanoutScope, FanoutStats, LiveRoom, Outbound, RoomManager};
pub use client::{ChatClient, ChatEvent, ConnectionState, PendingQueue};
pub use gateway::{AccountDirectory, GatewayError, OpenDirectory, SessionGateway};
pub use history::MessageLog;
pub use presence::PresenceFanout;
pub use protocol::{
    Account, AccountStatus, ChatMessage, ClientEvent, FileRef, ProtocolError, ReplyRef, Role,
    ServerEvent,
};
pub use room::{room_id_for, RoomIdError, ROOM_ID_SEPARATOR};
pub use server::{ChatServer, ServerConfig, ServerStats};
pub use storage::{MemoryStore, RocksStore, RoomRecord, RoomStore, StoreConfig, StoreError};
