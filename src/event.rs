//! Inbound events delivered to an agent.

use crate::types::{ChatId, MessageId, UserId};
use serde::{Deserialize, Serialize};

/// A chat participant as seen in an inbound event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: UserId,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl ChatUser {
    pub fn new(id: UserId, first_name: impl Into<String>) -> Self {
        Self {
            id,
            is_bot: false,
            first_name: first_name.into(),
            username: None,
        }
    }

    /// HTML mention linking to the user's profile
    pub fn mention_html(&self) -> String {
        format!(
            "<a href=\"tg://user?id={}\">{}</a>",
            self.id,
            escape_html(&self.first_name)
        )
    }
}

/// Escape the characters the platform's HTML parse mode treats as markup.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Event an agent receives from the platform.
///
/// Each event is handled on its own task; nothing orders two events, even for
/// the same chat and user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// One or more users joined a chat
    NewMembers {
        chat_id: ChatId,
        message_id: MessageId,
        members: Vec<ChatUser>,
    },
    /// Someone pressed a challenge button
    ChallengeResponse {
        callback_id: String,
        responder: ChatUser,
        /// Raw challenge payload attached to the button
        payload: String,
    },
    /// Plain text message
    Message {
        chat_id: ChatId,
        message_id: MessageId,
        from: ChatUser,
        text: String,
    },
    /// Slash command addressed to this agent (or to every bot)
    Command {
        chat_id: ChatId,
        message_id: MessageId,
        from: ChatUser,
        name: String,
        args: Vec<String>,
        reply_to: Option<ChatUser>,
    },
}

impl InboundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::NewMembers { .. } => "new_members",
            InboundEvent::ChallengeResponse { .. } => "challenge_response",
            InboundEvent::Message { .. } => "message",
            InboundEvent::Command { .. } => "command",
        }
    }
}
