//! Bot API wire types and their translation into inbound events.

use crate::event::{ChatUser, InboundEvent};
use crate::gateway::MembershipStatus;
use crate::types::{ChatId, MessageId, UserId};
use serde::Deserialize;

/// Envelope wrapping every Bot API response
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatMember {
    pub status: String,
    #[serde(default)]
    pub is_member: Option<bool>,
}

impl ChatMember {
    pub(crate) fn membership_status(&self) -> Option<MembershipStatus> {
        let status = match self.status.as_str() {
            "creator" => MembershipStatus::Creator,
            "administrator" => MembershipStatus::Administrator,
            "member" => MembershipStatus::Member,
            "restricted" => MembershipStatus::Restricted {
                is_member: self.is_member.unwrap_or(true),
            },
            "left" => MembershipStatus::Left,
            "kicked" => MembershipStatus::Kicked,
            _ => return None,
        };
        Some(status)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl From<User> for ChatUser {
    fn from(user: User) -> Self {
        ChatUser {
            id: user.id,
            is_bot: user.is_bot,
            first_name: user.first_name,
            username: user.username,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub new_chat_members: Option<Vec<User>>,
    #[serde(default)]
    pub reply_to_message: Option<Box<Message>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub data: Option<String>,
}

/// One entry from `getUpdates`
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SentMessage {
    pub message_id: MessageId,
    pub chat: Chat,
}

impl Update {
    /// Translate an update into an event for the agent whose bot username is
    /// `own_username`. Commands explicitly addressed to another bot are dropped.
    pub fn into_event(self, own_username: Option<&str>) -> Option<InboundEvent> {
        if let Some(query) = self.callback_query {
            return Some(InboundEvent::ChallengeResponse {
                callback_id: query.id,
                responder: query.from.into(),
                payload: query.data.unwrap_or_default(),
            });
        }

        let message = self.message?;
        if let Some(members) = message.new_chat_members {
            if members.is_empty() {
                return None;
            }
            return Some(InboundEvent::NewMembers {
                chat_id: message.chat.id,
                message_id: message.message_id,
                members: members.into_iter().map(ChatUser::from).collect(),
            });
        }

        let from: ChatUser = message.from?.into();
        let text = message.text?;
        if let Some(stripped) = text.strip_prefix('/') {
            let mut parts = stripped.split_whitespace();
            let head = parts.next()?;
            let (name, target) = match head.split_once('@') {
                Some((name, target)) => (name, Some(target)),
                None => (head, None),
            };
            if let (Some(target), Some(own)) = (target, own_username) {
                if !target.eq_ignore_ascii_case(own) {
                    return None;
                }
            }
            return Some(InboundEvent::Command {
                chat_id: message.chat.id,
                message_id: message.message_id,
                from,
                name: name.to_ascii_lowercase(),
                args: parts.map(str::to_string).collect(),
                reply_to: message
                    .reply_to_message
                    .and_then(|m| m.from)
                    .map(ChatUser::from),
            });
        }

        Some(InboundEvent::Message {
            chat_id: message.chat.id,
            message_id: message.message_id,
            from,
            text,
        })
    }
}
