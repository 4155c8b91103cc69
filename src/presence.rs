//! Presence Oracle
//!
//! Answers "is this agent currently a member of that chat?" with a live
//! membership query. No caching and no retries.

use crate::error::GatewayError;
use crate::gateway::MessagingGateway;
use crate::types::{ChatId, UserId};
use std::sync::Arc;
use tracing::debug;

pub struct PresenceOracle {
    gateway: Arc<dyn MessagingGateway>,
}

impl PresenceOracle {
    pub fn new(gateway: Arc<dyn MessagingGateway>) -> Self {
        Self { gateway }
    }

    /// Membership query that surfaces transport errors to the caller
    pub async fn probe(&self, chat_id: ChatId, platform_id: UserId) -> Result<bool, GatewayError> {
        let status = self
            .gateway
            .get_membership_status(chat_id, platform_id)
            .await?;
        Ok(status.is_present())
    }

    /// Membership query where any error counts as absent
    pub async fn is_present(&self, chat_id: ChatId, platform_id: UserId) -> bool {
        match self.probe(chat_id, platform_id).await {
            Ok(present) => present,
            Err(e) => {
                debug!(chat_id, platform_id, error = %e, "Presence query failed");
                false
            }
        }
    }
}
