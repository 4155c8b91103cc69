//! Admission State Machine
//!
//! Drives a new member through `Pending -> Verified` or `Pending -> Expelled`.
//! Both terminal states are the absence of a registry entry. Verification and
//! expiry race on the same entry; the registry's atomic removal picks the
//! winner and the loser degrades to a no-op.

use super::challenge::ChallengeRef;
use super::registry::{AdmissionRegistry, ExpiryCheck, PendingAdmission};
use super::scheduler::{DeadlineHandler, DeadlineScheduler, SchedulerStats};
use crate::agent::AgentLabel;
use crate::clock::Clock;
use crate::concurrency::KeyLockManager;
use crate::error::ApiError;
use crate::event::ChatUser;
use crate::gateway::{kick_member, MessagingGateway, PermissionSet};
use crate::types::{AdmissionKey, ChatId, UserId};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Admission timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Time a new member has to answer the challenge
    pub timeout: Duration,
    /// Margin added after the deadline before the check fires
    pub grace: Duration,
}

/// Longest accepted answer window
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);
/// Longest accepted delay between a deadline and its check
pub const MAX_GRACE: Duration = Duration::from_secs(60);

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            grace: Duration::from_secs(1),
        }
    }
}

impl AdmissionConfig {
    /// Reject windows that are empty or too long to schedule
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.timeout.is_zero() {
            return Err(ApiError::ConfigError(
                "admission timeout must be greater than zero".to_string(),
            ));
        }
        if self.timeout > MAX_TIMEOUT {
            return Err(ApiError::ConfigError(format!(
                "admission timeout of {}s exceeds the maximum of {}s",
                self.timeout.as_secs(),
                MAX_TIMEOUT.as_secs()
            )));
        }
        if self.grace > MAX_GRACE {
            return Err(ApiError::ConfigError(format!(
                "admission grace of {}ms exceeds the maximum of {}ms",
                self.grace.as_millis(),
                MAX_GRACE.as_millis()
            )));
        }
        Ok(())
    }

    /// Deadline in unix milliseconds for a member admitted at `now_ms`
    fn deadline_from(&self, now_ms: i64) -> Option<i64> {
        now_ms.checked_add(i64::try_from(self.timeout.as_millis()).ok()?)
    }
}

/// Result of a challenge response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// This response removed the pending entry
    Verified { restored: bool },
    /// No entry was left; permissions were restored anyway
    AlreadyResolved { restored: bool },
    /// Someone other than the restricted user pressed the button
    WrongUser { expected: UserId },
}

/// Result of a deadline check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireOutcome {
    /// The entry was due and removed; `kicked` reports the platform outcome
    Expelled { kicked: bool },
    /// The entry exists but is not yet due
    NotDue { rearmed: bool },
    /// Verified or expired already
    Absent,
}

/// Admission state machine for one agent
pub struct AdmissionStateMachine {
    agent: AgentLabel,
    gateway: Arc<dyn MessagingGateway>,
    registry: Arc<dyn AdmissionRegistry>,
    clock: Arc<dyn Clock>,
    scheduler: DeadlineScheduler,
    locks: KeyLockManager,
    config: AdmissionConfig,
}

impl AdmissionStateMachine {
    pub fn new(
        agent: AgentLabel,
        gateway: Arc<dyn MessagingGateway>,
        registry: Arc<dyn AdmissionRegistry>,
        clock: Arc<dyn Clock>,
        config: AdmissionConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            agent,
            gateway,
            registry,
            clock,
            scheduler: DeadlineScheduler::new(),
            locks: KeyLockManager::new(),
            config,
        })
    }

    /// Start the deadline sweeper, which calls back into [`Self::expire`]
    pub fn start(self: &Arc<Self>) {
        let handler: Arc<dyn DeadlineHandler> = Arc::clone(self) as Arc<dyn DeadlineHandler>;
        self.scheduler.start(handler);
    }

    pub async fn stop(&self) {
        self.scheduler.stop().await;
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// Join -> Pending.
    ///
    /// Records the pending entry, restricts the member, presents the challenge
    /// and arms the deadline check. Gateway failures are logged; only a
    /// registry failure aborts the admission.
    pub async fn admit(
        &self,
        chat_id: ChatId,
        user: &ChatUser,
    ) -> Result<PendingAdmission, ApiError> {
        self.config.validate()?;
        let key = AdmissionKey::new(chat_id, user.id);
        let _guard = self.locks.acquire(&key).await;

        let now_ms = self.clock.now_ms();
        let deadline_ms = self.config.deadline_from(now_ms).ok_or_else(|| {
            ApiError::ConfigError(format!("admission deadline overflows at {}ms", now_ms))
        })?;
        let pending = PendingAdmission {
            chat_id,
            user_id: user.id,
            deadline_ms,
            admitted_by: self.agent,
        };
        if let Some(previous) = self.registry.insert(pending.clone())? {
            info!(
                agent = %self.agent,
                key = %key,
                previous_agent = %previous.admitted_by,
                "Replaced pending admission for re-joining member"
            );
        }
        self.scheduler
            .schedule_in(key, self.config.timeout + self.config.grace);

        if let Err(e) = self
            .gateway
            .restrict_member(chat_id, user.id, &PermissionSet::restricted(), None)
            .await
        {
            warn!(
                agent = %self.agent,
                chat_id,
                user_id = user.id,
                error = %e,
                "Failed to restrict new member"
            );
        }

        let text = welcome_text(user, self.config.timeout);
        if let Err(e) = self
            .gateway
            .send_message_with_challenge(chat_id, &text, &ChallengeRef::from(key))
            .await
        {
            warn!(
                agent = %self.agent,
                chat_id,
                user_id = user.id,
                error = %e,
                "Failed to present verification challenge"
            );
        }

        info!(
            agent = %self.agent,
            chat_id,
            user_id = user.id,
            deadline_ms = pending.deadline_ms,
            "Member pending verification"
        );
        Ok(pending)
    }

    /// Pending -> Verified.
    ///
    /// Only the restricted user may answer their own challenge. A missing entry
    /// is not an error: permissions are restored regardless.
    pub async fn verify(
        &self,
        responder: UserId,
        challenge: &ChallengeRef,
    ) -> Result<VerifyOutcome, ApiError> {
        if responder != challenge.user_id {
            info!(
                agent = %self.agent,
                chat_id = challenge.chat_id,
                expected = challenge.user_id,
                responder,
                "Rejected challenge response from another user"
            );
            return Ok(VerifyOutcome::WrongUser {
                expected: challenge.user_id,
            });
        }

        let key = challenge.key();
        let _guard = self.locks.acquire(&key).await;

        let removed = self.registry.remove(&key)?;
        let restored = match self
            .gateway
            .restrict_member(key.chat_id, key.user_id, &PermissionSet::full(), None)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    agent = %self.agent,
                    key = %key,
                    error = %e,
                    "Failed to restore member permissions"
                );
                false
            }
        };

        match removed {
            Some(_) => {
                info!(agent = %self.agent, key = %key, restored, "Member verified");
                Ok(VerifyOutcome::Verified { restored })
            }
            None => {
                debug!(
                    agent = %self.agent,
                    key = %key,
                    "Challenge answered after admission was already resolved"
                );
                Ok(VerifyOutcome::AlreadyResolved { restored })
            }
        }
    }

    /// Pending -> Expelled.
    ///
    /// Re-reads the entry under the registry's atomic check: only an entry that
    /// still exists and is due is removed and kicked. Anything else is a no-op,
    /// except that a not-yet-due entry this agent owns gets a fresh check.
    pub async fn expire(&self, key: AdmissionKey) -> Result<ExpireOutcome, ApiError> {
        let _guard = self.locks.acquire(&key).await;
        let now_ms = self.clock.now_ms();

        match self.registry.remove_if_due(&key, now_ms)? {
            ExpiryCheck::Removed(_) => {
                let kicked = match kick_member(self.gateway.as_ref(), key.chat_id, key.user_id)
                    .await
                {
                    Ok(()) => true,
                    Err(e) => {
                        error!(
                            agent = %self.agent,
                            key = %key,
                            error = %e,
                            "Failed to remove unverified member"
                        );
                        false
                    }
                };
                info!(agent = %self.agent, key = %key, kicked, "Unverified member expelled");
                Ok(ExpireOutcome::Expelled { kicked })
            }
            ExpiryCheck::NotDue(pending) => {
                let rearmed = pending.admitted_by == self.agent;
                if rearmed {
                    // Entries written by another process may carry any deadline
                    let remaining = Duration::from_millis(
                        pending.deadline_ms.saturating_sub(now_ms).max(0) as u64,
                    )
                    .min(MAX_TIMEOUT);
                    self.scheduler
                        .schedule_in(key, remaining + self.config.grace);
                }
                debug!(
                    agent = %self.agent,
                    key = %key,
                    deadline_ms = pending.deadline_ms,
                    rearmed,
                    "Deadline check found entry not yet due"
                );
                Ok(ExpireOutcome::NotDue { rearmed })
            }
            ExpiryCheck::Absent => {
                debug!(agent = %self.agent, key = %key, "Deadline check found no pending entry");
                Ok(ExpireOutcome::Absent)
            }
        }
    }
}

#[async_trait]
impl DeadlineHandler for AdmissionStateMachine {
    async fn on_deadline(&self, key: AdmissionKey) {
        if let Err(e) = self.expire(key).await {
            error!(agent = %self.agent, key = %key, error = %e, "Deadline check failed");
        }
    }
}

fn welcome_text(user: &ChatUser, timeout: Duration) -> String {
    format!(
        "👋 Welcome, {}!\n\nTo prevent spam please verify by pressing the button below within {} seconds. If you don't verify you'll be removed.",
        user.mention_html(),
        timeout.as_secs()
    )
}
