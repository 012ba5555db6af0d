//! Deterministic room identity for 1:1 conversations.
//!
//! A room id is a pure function of the unordered pair of participant
//! account ids: sort the two ids by code-point order, join with `--`.
//! `room_id_for(a, b) == room_id_for(b, a)` for all valid pairs, and the
//! id is stable for the lifetime of the pair.

/// Separator between the two sorted participant ids.
///
/// Must not appear inside an account id; account ids are UUID-shaped
/// strings in practice, which never contain `--`.
pub const ROOM_ID_SEPARATOR: &str = "--";

/// Room derivation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomIdError {
    /// One of the participant ids is empty.
    EmptyId,
    /// Both participant ids are the same account (self-chat).
    SelfChat(String),
}

impl std::fmt::Display for RoomIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomIdError::EmptyId => write!(f, "participant id is empty"),
            RoomIdError::SelfChat(id) => write!(f, "self-chat is not a valid room: {id}"),
        }
    }
}

impl std::error::Error for RoomIdError {}

/// Derive the canonical room id for a pair of accounts.
///
/// Commutative over the pair and total over non-empty, distinct ids.
/// Self-chat is a caller bug and is rejected.
pub fn room_id_for(a: &str, b: &str) -> Result<String, RoomIdError> {
    if a.is_empty() || b.is_empty() {
        return Err(RoomIdError::EmptyId);
    }
    if a == b {
        return Err(RoomIdError::SelfChat(a.to_string()));
    }

    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    Ok(format!("{lo}{ROOM_ID_SEPARATOR}{hi}"))
}
