//! Shared fixtures: a recording in-memory gateway and agent wiring helpers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duet::admission::{
    AdmissionConfig, AdmissionRegistry, AdmissionStateMachine, ChallengeRef,
    InMemoryAdmissionRegistry,
};
use duet::agent::{AgentIdentity, AgentLabel};
use duet::clock::{Clock, TokioClock};
use duet::error::GatewayError;
use duet::gateway::{BotUser, MembershipStatus, MessageHandle, MessagingGateway, PermissionSet};
use duet::types::{ChatId, MessageId, UserId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const CHAT: ChatId = -1001;
pub const AGENT_A_ID: UserId = 9001;
pub const AGENT_B_ID: UserId = 9002;

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Restrict {
        chat_id: ChatId,
        user_id: UserId,
        permissions: PermissionSet,
        until: Option<DateTime<Utc>>,
    },
    Ban {
        chat_id: ChatId,
        user_id: UserId,
    },
    Unban {
        chat_id: ChatId,
        user_id: UserId,
    },
    Challenge {
        chat_id: ChatId,
        text: String,
        payload: String,
    },
    Send {
        chat_id: ChatId,
        text: String,
    },
    Answer {
        callback_id: String,
        text: String,
        alert: bool,
    },
    Delete {
        chat_id: ChatId,
        message_id: MessageId,
    },
}

/// In-memory gateway that records every outbound call.
///
/// Membership defaults to `Left` for unknown users.
pub struct RecordingGateway {
    me: BotUser,
    calls: Mutex<Vec<GatewayCall>>,
    statuses: Mutex<HashMap<(ChatId, UserId), MembershipStatus>>,
    fail_membership: AtomicBool,
    fail_actions: AtomicBool,
    next_message_id: AtomicI64,
}

impl RecordingGateway {
    pub fn new(bot_id: UserId) -> Arc<Self> {
        Arc::new(Self {
            me: BotUser {
                id: bot_id,
                is_bot: true,
                first_name: format!("bot{}", bot_id),
                username: Some(format!("bot{}_bot", bot_id)),
            },
            calls: Mutex::new(Vec::new()),
            statuses: Mutex::new(HashMap::new()),
            fail_membership: AtomicBool::new(false),
            fail_actions: AtomicBool::new(false),
            next_message_id: AtomicI64::new(1),
        })
    }

    pub fn set_status(&self, chat_id: ChatId, user_id: UserId, status: MembershipStatus) {
        self.statuses.lock().insert((chat_id, user_id), status);
    }

    pub fn fail_membership_queries(&self, fail: bool) {
        self.fail_membership.store(fail, Ordering::SeqCst);
    }

    /// Make every restrict/ban/unban/send call fail
    pub fn fail_actions(&self, fail: bool) {
        self.fail_actions.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().clone()
    }

    pub fn bans_of(&self, user_id: UserId) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, GatewayCall::Ban { user_id: u, .. } if *u == user_id))
            .count()
    }

    pub fn unbans_of(&self, user_id: UserId) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, GatewayCall::Unban { user_id: u, .. } if *u == user_id))
            .count()
    }

    pub fn restrictions_of(&self, user_id: UserId) -> Vec<PermissionSet> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::Restrict {
                    user_id: u,
                    permissions,
                    ..
                } if u == user_id => Some(permissions),
                _ => None,
            })
            .collect()
    }

    pub fn challenges(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::Challenge { payload, .. } => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::Send { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn answers(&self) -> Vec<(String, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::Answer { text, alert, .. } => Some((text, alert)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: GatewayCall) -> Result<(), GatewayError> {
        self.calls.lock().push(call);
        if self.fail_actions.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                method: "test".to_string(),
                code: 400,
                description: "Bad Request: not enough rights".to_string(),
            });
        }
        Ok(())
    }

    fn next_handle(&self, chat_id: ChatId) -> MessageHandle {
        MessageHandle {
            chat_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn get_me(&self) -> Result<BotUser, GatewayError> {
        Ok(self.me.clone())
    }

    async fn get_membership_status(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<MembershipStatus, GatewayError> {
        if self.fail_membership.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("connection reset".to_string()));
        }
        Ok(self
            .statuses
            .lock()
            .get(&(chat_id, user_id))
            .copied()
            .unwrap_or(MembershipStatus::Left))
    }

    async fn restrict_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        permissions: &PermissionSet,
        until: Option<DateTime<Utc>>,
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::Restrict {
            chat_id,
            user_id,
            permissions: *permissions,
            until,
        })
    }

    async fn ban_member(&self, chat_id: ChatId, user_id: UserId) -> Result<(), GatewayError> {
        self.record(GatewayCall::Ban { chat_id, user_id })
    }

    async fn unban_member(&self, chat_id: ChatId, user_id: UserId) -> Result<(), GatewayError> {
        self.record(GatewayCall::Unban { chat_id, user_id })
    }

    async fn send_message_with_challenge(
        &self,
        chat_id: ChatId,
        text: &str,
        challenge: &ChallengeRef,
    ) -> Result<MessageHandle, GatewayError> {
        self.record(GatewayCall::Challenge {
            chat_id,
            text: text.to_string(),
            payload: challenge.to_payload(),
        })?;
        Ok(self.next_handle(chat_id))
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
    ) -> Result<MessageHandle, GatewayError> {
        self.record(GatewayCall::Send {
            chat_id,
            text: text.to_string(),
        })?;
        Ok(self.next_handle(chat_id))
    }

    async fn answer_challenge(
        &self,
        callback_id: &str,
        text: &str,
        alert: bool,
    ) -> Result<(), GatewayError> {
        // Answers never fail; the platform accepts them for any live button
        self.calls.lock().push(GatewayCall::Answer {
            callback_id: callback_id.to_string(),
            text: text.to_string(),
            alert,
        });
        Ok(())
    }

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::Delete {
            chat_id,
            message_id,
        })
    }
}

pub fn identity(label: AgentLabel) -> AgentIdentity {
    match label {
        AgentLabel::A => AgentIdentity::new(AgentLabel::A, AGENT_A_ID, "Mitsuha"),
        AgentLabel::B => AgentIdentity::new(AgentLabel::B, AGENT_B_ID, "Taki"),
    }
}

pub fn admission_config(timeout_secs: u64) -> AdmissionConfig {
    AdmissionConfig {
        timeout: Duration::from_secs(timeout_secs),
        grace: Duration::from_secs(1),
    }
}

/// A started state machine for agent `label` over a fresh gateway and registry
pub struct MachineFixture {
    pub gateway: Arc<RecordingGateway>,
    pub registry: Arc<InMemoryAdmissionRegistry>,
    pub clock: Arc<TokioClock>,
    pub machine: Arc<AdmissionStateMachine>,
}

impl MachineFixture {
    pub fn start(label: AgentLabel, timeout_secs: u64) -> Self {
        let registry = Arc::new(InMemoryAdmissionRegistry::new());
        Self::start_with_registry(label, timeout_secs, registry)
    }

    pub fn start_with_registry(
        label: AgentLabel,
        timeout_secs: u64,
        registry: Arc<InMemoryAdmissionRegistry>,
    ) -> Self {
        let gateway = RecordingGateway::new(identity(label).platform_id);
        let clock = Arc::new(TokioClock::new());
        let machine = AdmissionStateMachine::new(
            label,
            gateway.clone() as Arc<dyn MessagingGateway>,
            registry.clone() as Arc<dyn AdmissionRegistry>,
            clock.clone() as Arc<dyn Clock>,
            admission_config(timeout_secs),
        );
        machine.start();
        Self {
            gateway,
            registry,
            clock,
            machine,
        }
    }
}

/// Let spawned tasks run to completion without advancing time
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
