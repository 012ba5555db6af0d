//! Ephemeral presence signals: typing indicators and reactions.
//!
//! Neither signal touches storage. Typing goes to the room except the
//! sender (the sender knows they are typing); reactions go to the whole
//! room so every view updates the same way. A room with no live
//! subscribers is a no-op, not an error.

use std::sync::Arc;
use uuid::Uuid;

use crate::broadcast::{FanoutScope, Outbound, RoomManager};
use crate::protocol::ServerEvent;

/// Fan-out for non-persistent room signals.
pub struct PresenceFanout {
    rooms: Arc<RoomManager>,
}

impl PresenceFanout {
    pub fn new(rooms: Arc<RoomManager>) -> Self {
        Self { rooms }
    }

    /// Relay a typing indicator to the room, excluding the sender's
    /// connection. Returns the number of receivers reached.
    pub async fn typing(
        &self,
        room_id: &str,
        account_id: &str,
        value: bool,
        conn: Uuid,
    ) -> usize {
        let event = ServerEvent::Typing {
            account_id: account_id.to_string(),
            value,
        };
        self.relay(room_id, &event, conn, FanoutScope::RoomExceptOrigin)
            .await
    }

    /// Relay a reaction to the whole room, including the sender.
    pub async fn reaction(
        &self,
        room_id: &str,
        message_id: &str,
        by_account_id: &str,
        reaction: &str,
        conn: Uuid,
    ) -> usize {
        let event = ServerEvent::Reaction {
            message_id: message_id.to_string(),
            by_account_id: by_account_id.to_string(),
            reaction: reaction.to_string(),
        };
        self.relay(room_id, &event, conn, FanoutScope::Room).await
    }

    async fn relay(
        &self,
        room_id: &str,
        event: &ServerEvent,
        origin: Uuid,
        scope: FanoutScope,
    ) -> usize {
        // Signals never create rooms; an unjoined room has nobody to tell
        let Some(live) = self.rooms.get(room_id).await else {
            return 0;
        };
        match event.encode() {
            Ok(frame) => live.fanout.send(Outbound {
                origin,
                scope,
                frame: Arc::new(frame),
            }),
            Err(e) => {
                log::error!("Failed to encode presence frame: {e}");
                0
            }
        }
    }
}
