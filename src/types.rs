//! Core identifier types shared across duet.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform chat identifier (negative for groups on Telegram)
pub type ChatId = i64;

/// Platform user identifier; bots are users too
pub type UserId = i64;

/// Per-chat message identifier. Identical for every bot observing the chat.
pub type MessageId = i64;

/// Key of a pending admission: one entry per (chat, user).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AdmissionKey {
    pub chat_id: ChatId,
    pub user_id: UserId,
}

impl AdmissionKey {
    pub fn new(chat_id: ChatId, user_id: UserId) -> Self {
        Self { chat_id, user_id }
    }

    /// Big-endian byte encoding, so sled orders keys by chat then user.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.chat_id.to_be_bytes());
        out[8..].copy_from_slice(&self.user_id.to_be_bytes());
        out
    }
}

impl fmt::Display for AdmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chat_id, self.user_id)
    }
}
