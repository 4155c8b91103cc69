//! Messaging Gateway
//!
//! The port through which agents observe and act on chats. The admission state
//! machine, the presence oracle and the moderation commands only ever talk to
//! the platform through [`MessagingGateway`]; [`telegram::TelegramGateway`] is
//! the production adapter.

pub mod telegram;

use crate::admission::ChallengeRef;
use crate::error::GatewayError;
use crate::types::{ChatId, MessageId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use telegram::TelegramGateway;

/// Membership status of a user in a chat as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    Creator,
    Administrator,
    Member,
    /// Restricted users may or may not still be in the chat
    Restricted { is_member: bool },
    Left,
    Kicked,
}

impl MembershipStatus {
    /// Whether the user currently belongs to the chat
    pub fn is_present(&self) -> bool {
        match self {
            MembershipStatus::Creator
            | MembershipStatus::Administrator
            | MembershipStatus::Member => true,
            MembershipStatus::Restricted { is_member } => *is_member,
            MembershipStatus::Left | MembershipStatus::Kicked => false,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            MembershipStatus::Creator | MembershipStatus::Administrator
        )
    }
}

/// Send permissions applied to a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub can_send_messages: bool,
    pub can_send_audios: bool,
    pub can_send_documents: bool,
    pub can_send_photos: bool,
    pub can_send_videos: bool,
    pub can_send_video_notes: bool,
    pub can_send_voice_notes: bool,
    pub can_send_polls: bool,
    pub can_send_other_messages: bool,
    pub can_add_web_page_previews: bool,
}

impl PermissionSet {
    /// Nothing may be sent; used while a new member is pending verification
    pub fn restricted() -> Self {
        Self::uniform(false)
    }

    /// Everything a regular member may send
    pub fn full() -> Self {
        Self::uniform(true)
    }

    fn uniform(allowed: bool) -> Self {
        Self {
            can_send_messages: allowed,
            can_send_audios: allowed,
            can_send_documents: allowed,
            can_send_photos: allowed,
            can_send_videos: allowed,
            can_send_video_notes: allowed,
            can_send_voice_notes: allowed,
            can_send_polls: allowed,
            can_send_other_messages: allowed,
            can_add_web_page_previews: allowed,
        }
    }
}

/// The account behind a gateway client
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotUser {
    pub id: UserId,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// Handle to a message the gateway sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHandle {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Outbound operations against the messaging platform.
///
/// Calls are single best-effort attempts; implementations never retry.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Account the gateway is authenticated as
    async fn get_me(&self) -> Result<BotUser, GatewayError>;

    async fn get_membership_status(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<MembershipStatus, GatewayError>;

    /// Apply a permission set, optionally until a point in time
    async fn restrict_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        permissions: &PermissionSet,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), GatewayError>;

    async fn ban_member(&self, chat_id: ChatId, user_id: UserId) -> Result<(), GatewayError>;

    async fn unban_member(&self, chat_id: ChatId, user_id: UserId) -> Result<(), GatewayError>;

    /// Send a message carrying a one-tap challenge button
    async fn send_message_with_challenge(
        &self,
        chat_id: ChatId,
        text: &str,
        challenge: &ChallengeRef,
    ) -> Result<MessageHandle, GatewayError>;

    async fn send_message(&self, chat_id: ChatId, text: &str)
        -> Result<MessageHandle, GatewayError>;

    /// Answer a challenge button press, optionally as a modal alert
    async fn answer_challenge(
        &self,
        callback_id: &str,
        text: &str,
        alert: bool,
    ) -> Result<(), GatewayError>;

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), GatewayError>;
}

/// Remove a member without a lasting ban: ban, then immediately unban.
pub async fn kick_member(
    gateway: &dyn MessagingGateway,
    chat_id: ChatId,
    user_id: UserId,
) -> Result<(), GatewayError> {
    gateway.ban_member(chat_id, user_id).await?;
    gateway.unban_member(chat_id, user_id).await
}
