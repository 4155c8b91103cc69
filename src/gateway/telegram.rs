//! Telegram Bot API adapter for [`MessagingGateway`].

pub mod wire;

use super::{BotUser, MembershipStatus, MessageHandle, MessagingGateway, PermissionSet};
use crate::admission::ChallengeRef;
use crate::config::GatewayConfig;
use crate::error::{ApiError, GatewayError};
use crate::types::{ChatId, MessageId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::time::Duration;
use tracing::debug;
use wire::{ApiResponse, ChatMember, SentMessage, Update};

const CHALLENGE_BUTTON_LABEL: &str = "I'm human ✅";

/// Bot API client for one bot token
pub struct TelegramGateway {
    client: reqwest::Client,
    /// `{api_base}/bot{token}`; never logged
    endpoint: String,
    poll_timeout: Duration,
    request_timeout: Duration,
}

impl fmt::Debug for TelegramGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramGateway")
            .field("endpoint", &"<redacted>")
            .field("poll_timeout", &self.poll_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl TelegramGateway {
    pub fn new(config: &GatewayConfig, token: &str) -> Result<Self, ApiError> {
        if token.trim().is_empty() {
            return Err(ApiError::ConfigError("Bot token is empty".to_string()));
        }
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ApiError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{}", config.api_base.trim_end_matches('/'), token.trim()),
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
            request_timeout,
        })
    }

    /// Long-poll for updates after `offset`
    pub async fn poll_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, GatewayError> {
        let params = json!({
            "offset": offset,
            "timeout": self.poll_timeout.as_secs(),
            "allowed_updates": ["message", "callback_query"],
        });
        self.call_with_timeout(
            "getUpdates",
            &params,
            self.poll_timeout + self.request_timeout,
        )
        .await
    }

    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, GatewayError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.call_with_timeout(method, params, self.request_timeout)
            .await
    }

    async fn call_with_timeout<P, R>(
        &self,
        method: &str,
        params: &P,
        timeout: Duration,
    ) -> Result<R, GatewayError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.endpoint, method);
        // reqwest errors embed the URL, which carries the token
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(params)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(describe_transport_error(method, &e)))?;

        let envelope: ApiResponse<R> = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(describe_transport_error(method, &e)))?;

        if envelope.ok {
            debug!(method, "Gateway call succeeded");
            envelope
                .result
                .ok_or_else(|| GatewayError::Decode(format!("{}: missing result", method)))
        } else {
            Err(GatewayError::Rejected {
                method: method.to_string(),
                code: envelope.error_code.unwrap_or_default(),
                description: envelope
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            })
        }
    }
}

fn describe_transport_error(method: &str, err: &reqwest::Error) -> String {
    let kind = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "connection failed"
    } else if err.is_decode() {
        "undecodable body"
    } else if let Some(status) = err.status() {
        return format!("{} failed with HTTP {}", method, status);
    } else {
        "request failed"
    };
    format!("{} {}", method, kind)
}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    async fn get_me(&self) -> Result<BotUser, GatewayError> {
        self.call("getMe", &json!({})).await
    }

    async fn get_membership_status(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<MembershipStatus, GatewayError> {
        let member: ChatMember = self
            .call(
                "getChatMember",
                &json!({ "chat_id": chat_id, "user_id": user_id }),
            )
            .await?;
        member.membership_status().ok_or_else(|| {
            GatewayError::Decode(format!("getChatMember: unknown status '{}'", member.status))
        })
    }

    async fn restrict_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        permissions: &PermissionSet,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), GatewayError> {
        let _: bool = self
            .call(
                "restrictChatMember",
                &json!({
                    "chat_id": chat_id,
                    "user_id": user_id,
                    "permissions": permissions,
                    "use_independent_chat_permissions": true,
                    "until_date": until.map(|t| t.timestamp()),
                }),
            )
            .await?;
        Ok(())
    }

    async fn ban_member(&self, chat_id: ChatId, user_id: UserId) -> Result<(), GatewayError> {
        let _: bool = self
            .call(
                "banChatMember",
                &json!({ "chat_id": chat_id, "user_id": user_id }),
            )
            .await?;
        Ok(())
    }

    async fn unban_member(&self, chat_id: ChatId, user_id: UserId) -> Result<(), GatewayError> {
        let _: bool = self
            .call(
                "unbanChatMember",
                &json!({ "chat_id": chat_id, "user_id": user_id, "only_if_banned": true }),
            )
            .await?;
        Ok(())
    }

    async fn send_message_with_challenge(
        &self,
        chat_id: ChatId,
        text: &str,
        challenge: &ChallengeRef,
    ) -> Result<MessageHandle, GatewayError> {
        let sent: SentMessage = self
            .call(
                "sendMessage",
                &json!({
                    "chat_id": chat_id,
                    "text": text,
                    "parse_mode": "HTML",
                    "reply_markup": {
                        "inline_keyboard": [[{
                            "text": CHALLENGE_BUTTON_LABEL,
                            "callback_data": challenge.to_payload(),
                        }]]
                    },
                }),
            )
            .await?;
        Ok(MessageHandle {
            chat_id: sent.chat.id,
            message_id: sent.message_id,
        })
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
    ) -> Result<MessageHandle, GatewayError> {
        let sent: SentMessage = self
            .call(
                "sendMessage",
                &json!({ "chat_id": chat_id, "text": text, "parse_mode": "HTML" }),
            )
            .await?;
        Ok(MessageHandle {
            chat_id: sent.chat.id,
            message_id: sent.message_id,
        })
    }

    async fn answer_challenge(
        &self,
        callback_id: &str,
        text: &str,
        alert: bool,
    ) -> Result<(), GatewayError> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                &json!({
                    "callback_query_id": callback_id,
                    "text": text,
                    "show_alert": alert,
                }),
            )
            .await?;
        Ok(())
    }

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), GatewayError> {
        let _: bool = self
            .call(
                "deleteMessage",
                &json!({ "chat_id": chat_id, "message_id": message_id }),
            )
            .await?;
        Ok(())
    }
}
