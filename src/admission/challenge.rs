//! Challenge references carried by the one-tap verification button.

use crate::error::ApiError;
use crate::types::{AdmissionKey, ChatId, UserId};

const PREFIX: &str = "verify";

/// Opaque reference embedded in a challenge, naming the pending admission it
/// resolves. Encoded as `verify:<chat_id>:<user_id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChallengeRef {
    pub chat_id: ChatId,
    pub user_id: UserId,
}

impl ChallengeRef {
    pub fn new(chat_id: ChatId, user_id: UserId) -> Self {
        Self { chat_id, user_id }
    }

    pub fn key(&self) -> AdmissionKey {
        AdmissionKey::new(self.chat_id, self.user_id)
    }

    pub fn to_payload(&self) -> String {
        format!("{}:{}:{}", PREFIX, self.chat_id, self.user_id)
    }

    /// Parse a button payload. Payloads from other buttons are rejected.
    pub fn parse(payload: &str) -> Result<Self, ApiError> {
        let mut parts = payload.split(':');
        let (Some(prefix), Some(chat), Some(user), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ApiError::InvalidChallenge(payload.to_string()));
        };
        if prefix != PREFIX {
            return Err(ApiError::InvalidChallenge(payload.to_string()));
        }
        let chat_id = chat
            .parse::<ChatId>()
            .map_err(|_| ApiError::InvalidChallenge(payload.to_string()))?;
        let user_id = user
            .parse::<UserId>()
            .map_err(|_| ApiError::InvalidChallenge(payload.to_string()))?;
        Ok(Self { chat_id, user_id })
    }
}

impl From<AdmissionKey> for ChallengeRef {
    fn from(key: AdmissionKey) -> Self {
        Self::new(key.chat_id, key.user_id)
    }
}
