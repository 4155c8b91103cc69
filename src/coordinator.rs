//! Event Coordinator
//!
//! Routes each inbound event through the duty arbiter before it reaches the
//! admission state machine or a moderation action.

use crate::admission::{AdmissionStateMachine, ChallengeRef, VerifyOutcome};
use crate::agent::{AgentIdentity, AgentRoster};
use crate::arbiter::DutyArbiter;
use crate::clock::Clock;
use crate::error::ApiError;
use crate::event::{ChatUser, InboundEvent};
use crate::gateway::MessagingGateway;
use crate::moderation::{contains_link, is_privileged, ChatSettings, ModerationCommand};
use crate::types::{ChatId, MessageId, UserId};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const PARTNER_DUTY: &str = "This duty is handled by my partner right now. Try again.";
const NOT_PRIVILEGED: &str = "❌ You must be admin to use this.";
const WRONG_USER: &str = "🔒 Please press the button using the same account that joined.";
const VERIFIED: &str = "✅ Verified, enjoy!";
const STALE_CHALLENGE: &str = "This button is no longer valid.";

/// What the coordinator did with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// The arbiter gave the event to the partner
    Deferred,
    /// New members put through admission
    Admitted { count: usize },
    Challenge(VerifyOutcome),
    LinkRemoved,
    CommandExecuted { name: String },
    /// Sender may not issue the command
    Denied,
    Ignored,
}

pub struct EventCoordinator {
    me: AgentIdentity,
    roster: AgentRoster,
    arbiter: DutyArbiter,
    admissions: Arc<AdmissionStateMachine>,
    gateway: Arc<dyn MessagingGateway>,
    clock: Arc<dyn Clock>,
    settings: Arc<ChatSettings>,
    owner_id: Option<UserId>,
}

impl EventCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        roster: AgentRoster,
        arbiter: DutyArbiter,
        admissions: Arc<AdmissionStateMachine>,
        gateway: Arc<dyn MessagingGateway>,
        clock: Arc<dyn Clock>,
        settings: Arc<ChatSettings>,
        owner_id: Option<UserId>,
    ) -> Self {
        Self {
            me: arbiter.me().clone(),
            roster,
            arbiter,
            admissions,
            gateway,
            clock,
            settings,
            owner_id,
        }
    }

    pub fn agent(&self) -> &AgentIdentity {
        &self.me
    }

    pub fn admissions(&self) -> &Arc<AdmissionStateMachine> {
        &self.admissions
    }

    pub async fn handle(&self, event: InboundEvent) -> Result<Handled, ApiError> {
        debug!(agent = %self.me.label, kind = event.kind(), "Handling event");
        match event {
            InboundEvent::NewMembers {
                chat_id,
                message_id,
                members,
            } => self.on_new_members(chat_id, message_id, members).await,
            InboundEvent::ChallengeResponse {
                callback_id,
                responder,
                payload,
            } => self.on_challenge(&callback_id, &responder, &payload).await,
            InboundEvent::Message {
                chat_id,
                message_id,
                from,
                text,
            } => Ok(self.on_message(chat_id, message_id, &from, &text).await),
            InboundEvent::Command {
                chat_id,
                message_id,
                from,
                name,
                args,
                reply_to,
            } => Ok(self
                .on_command(chat_id, message_id, &from, &name, &args, reply_to.as_ref())
                .await),
        }
    }

    async fn on_new_members(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        members: Vec<ChatUser>,
    ) -> Result<Handled, ApiError> {
        let humans: Vec<ChatUser> = members
            .into_iter()
            .filter(|m| !m.is_bot && !self.roster.is_agent(m.id))
            .collect();
        if humans.is_empty() {
            return Ok(Handled::Ignored);
        }

        if !self.arbiter.should_act(chat_id, message_id).await {
            debug!(agent = %self.me.label, chat_id, "Welcome duty deferred to partner");
            return Ok(Handled::Deferred);
        }

        // One failed admission must not leave later joiners unrestricted
        let mut admitted = 0;
        for member in &humans {
            match self.admissions.admit(chat_id, member).await {
                Ok(_) => admitted += 1,
                Err(e) => error!(
                    agent = %self.me.label,
                    chat_id,
                    user_id = member.id,
                    error = %e,
                    "Failed to admit new member"
                ),
            }
        }
        Ok(Handled::Admitted { count: admitted })
    }

    /// Challenge buttons belong to the agent that sent them, so no arbitration
    async fn on_challenge(
        &self,
        callback_id: &str,
        responder: &ChatUser,
        payload: &str,
    ) -> Result<Handled, ApiError> {
        let challenge = match ChallengeRef::parse(payload) {
            Ok(challenge) => challenge,
            Err(e) => {
                warn!(agent = %self.me.label, responder = responder.id, error = %e, "Ignoring malformed challenge payload");
                self.acknowledge(callback_id, STALE_CHALLENGE, false).await;
                return Ok(Handled::Ignored);
            }
        };

        let outcome = self.admissions.verify(responder.id, &challenge).await?;
        match outcome {
            VerifyOutcome::WrongUser { .. } => {
                self.acknowledge(callback_id, WRONG_USER, true).await
            }
            VerifyOutcome::Verified { .. } | VerifyOutcome::AlreadyResolved { .. } => {
                self.acknowledge(callback_id, VERIFIED, false).await
            }
        }
        Ok(Handled::Challenge(outcome))
    }

    async fn on_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        from: &ChatUser,
        text: &str,
    ) -> Handled {
        if !self.settings.anti_link_enabled(chat_id)
            || !contains_link(text)
            || self.roster.is_agent(from.id)
        {
            return Handled::Ignored;
        }
        if !self.arbiter.should_act(chat_id, message_id).await {
            return Handled::Deferred;
        }
        if is_privileged(self.gateway.as_ref(), chat_id, from.id, self.owner_id).await {
            return Handled::Ignored;
        }

        if let Err(e) = self.gateway.delete_message(chat_id, message_id).await {
            warn!(agent = %self.me.label, chat_id, message_id, error = %e, "Failed to delete link message");
            return Handled::Ignored;
        }
        let notice = format!("🚫 {}, links are not allowed here.", from.mention_html());
        self.reply(chat_id, &notice).await;
        info!(agent = %self.me.label, chat_id, user_id = from.id, "Removed message containing a link");
        Handled::LinkRemoved
    }

    async fn on_command(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        from: &ChatUser,
        name: &str,
        args: &[String],
        reply_to: Option<&ChatUser>,
    ) -> Handled {
        let parsed = match ModerationCommand::parse(name, args, reply_to) {
            Ok(Some(command)) => Ok(command),
            Ok(None) => return Handled::Ignored,
            Err(usage) => Err(usage),
        };

        if let Ok(command) = &parsed {
            if !command.requires_arbitration() {
                return self.execute(chat_id, name, command).await;
            }
        }

        let (privileged, act) = tokio::join!(
            is_privileged(self.gateway.as_ref(), chat_id, from.id, self.owner_id),
            self.arbiter.should_act(chat_id, message_id),
        );

        if !act {
            // Only admins hear about the handover; anyone else is ignored by both
            if privileged {
                self.reply(chat_id, PARTNER_DUTY).await;
            }
            return Handled::Deferred;
        }
        if !privileged {
            self.reply(chat_id, NOT_PRIVILEGED).await;
            return Handled::Denied;
        }

        match parsed {
            Ok(command) => self.execute(chat_id, name, &command).await,
            Err(usage) => {
                self.reply(chat_id, &usage.to_string()).await;
                Handled::Ignored
            }
        }
    }

    async fn execute(&self, chat_id: ChatId, name: &str, command: &ModerationCommand) -> Handled {
        let result = command
            .execute(
                self.gateway.as_ref(),
                self.clock.as_ref(),
                &self.settings,
                chat_id,
                &self.me.name,
            )
            .await;
        match result {
            Ok(text) => {
                info!(agent = %self.me.label, chat_id, command = name, "Command executed");
                self.reply(chat_id, &text).await;
            }
            Err(e) => {
                warn!(agent = %self.me.label, chat_id, command = name, error = %e, "Command failed");
                self.reply(chat_id, &format!("Error: {}", crate::event::escape_html(&e.to_string())))
                    .await;
            }
        }
        Handled::CommandExecuted {
            name: name.to_string(),
        }
    }

    async fn reply(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.gateway.send_message(chat_id, text).await {
            warn!(agent = %self.me.label, chat_id, error = %e, "Failed to send reply");
        }
    }

    async fn acknowledge(&self, callback_id: &str, text: &str, alert: bool) {
        if let Err(e) = self.gateway.answer_challenge(callback_id, text, alert).await {
            warn!(agent = %self.me.label, error = %e, "Failed to answer challenge");
        }
    }
}
