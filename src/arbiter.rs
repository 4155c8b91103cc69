//! Duty Arbiter
//!
//! Decides, per event, whether this agent handles it. The two agents never talk
//! to each other; each one looks at live presence of both accounts in the chat
//! and draws locally when both are present.
//!
//! Decision table:
//!
//! | own presence | partner presence | act                 |
//! |--------------|------------------|---------------------|
//! | query failed | any              | yes (fail open)     |
//! | any          | query failed     | yes (fail open)     |
//! | present      | present          | draw                |
//! | present      | absent           | yes                 |
//! | absent       | present / absent | no                  |

use crate::agent::{AgentIdentity, AgentLabel};
use crate::presence::PresenceOracle;
use crate::types::{ChatId, MessageId};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// How the two agents split an event when both are present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DutyPolicy {
    /// Each agent flips its own coin; both or neither may act
    #[default]
    Independent,
    /// Both agents derive the same pick from the event itself
    EventKeyed { epoch: u64 },
}

/// Why a decision came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Basis {
    FailOpen,
    CoinFlip,
    EventKeyed,
    SoleAgent,
    PartnerOnly,
    NeitherPresent,
}

impl Basis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Basis::FailOpen => "fail_open",
            Basis::CoinFlip => "coin_flip",
            Basis::EventKeyed => "event_keyed",
            Basis::SoleAgent => "sole_agent",
            Basis::PartnerOnly => "partner_only",
            Basis::NeitherPresent => "neither_present",
        }
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one arbitration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arbitration {
    pub act: bool,
    pub basis: Basis,
}

/// Apply the decision table.
///
/// `None` means the presence query failed. `draw` is only consulted when both
/// agents are present.
pub fn decide(
    own_present: Option<bool>,
    partner_present: Option<bool>,
    draw: impl FnOnce() -> Arbitration,
) -> Arbitration {
    match (own_present, partner_present) {
        (None, _) | (_, None) => Arbitration {
            act: true,
            basis: Basis::FailOpen,
        },
        (Some(true), Some(true)) => draw(),
        (Some(true), Some(false)) => Arbitration {
            act: true,
            basis: Basis::SoleAgent,
        },
        (Some(false), Some(true)) => Arbitration {
            act: false,
            basis: Basis::PartnerOnly,
        },
        (Some(false), Some(false)) => Arbitration {
            act: false,
            basis: Basis::NeitherPresent,
        },
    }
}

/// Deterministic pick shared by both agents: the label whose turn this event is.
pub fn keyed_pick(chat_id: ChatId, event_id: MessageId, epoch: u64) -> AgentLabel {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&chat_id.to_be_bytes());
    hasher.update(&event_id.to_be_bytes());
    hasher.update(&epoch.to_be_bytes());
    let digest = hasher.finalize();
    debug!(
        chat_id,
        event_id,
        epoch,
        digest = %hex::encode(&digest.as_bytes()[..8]),
        "Event-keyed draw"
    );
    if digest.as_bytes()[0] & 1 == 0 {
        AgentLabel::A
    } else {
        AgentLabel::B
    }
}

pub struct DutyArbiter {
    me: AgentIdentity,
    partner: AgentIdentity,
    oracle: PresenceOracle,
    policy: DutyPolicy,
    rng: Mutex<StdRng>,
}

impl DutyArbiter {
    pub fn new(
        me: AgentIdentity,
        partner: AgentIdentity,
        oracle: PresenceOracle,
        policy: DutyPolicy,
    ) -> Self {
        Self::with_rng(me, partner, oracle, policy, StdRng::from_entropy())
    }

    /// Arbiter with a reproducible coin
    pub fn with_seed(
        me: AgentIdentity,
        partner: AgentIdentity,
        oracle: PresenceOracle,
        policy: DutyPolicy,
        seed: u64,
    ) -> Self {
        Self::with_rng(me, partner, oracle, policy, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        me: AgentIdentity,
        partner: AgentIdentity,
        oracle: PresenceOracle,
        policy: DutyPolicy,
        rng: StdRng,
    ) -> Self {
        if let DutyPolicy::EventKeyed { epoch } = policy {
            warn!(
                agent = %me.label,
                epoch,
                "Event-keyed duty policy enabled: both agents will agree on the actor for every event"
            );
        }
        Self {
            me,
            partner,
            oracle,
            policy,
            rng: Mutex::new(rng),
        }
    }

    pub fn policy(&self) -> DutyPolicy {
        self.policy
    }

    pub fn me(&self) -> &AgentIdentity {
        &self.me
    }

    pub fn partner(&self) -> &AgentIdentity {
        &self.partner
    }

    /// Whether this agent handles the event. Never fails.
    pub async fn should_act(&self, chat_id: ChatId, event_id: MessageId) -> bool {
        self.arbitrate(chat_id, event_id).await.act
    }

    /// Full arbitration including its basis
    pub async fn arbitrate(&self, chat_id: ChatId, event_id: MessageId) -> Arbitration {
        let (own, partner) = tokio::join!(
            self.oracle.probe(chat_id, self.me.platform_id),
            self.oracle.probe(chat_id, self.partner.platform_id),
        );

        if let Err(e) = &own {
            warn!(agent = %self.me.label, chat_id, error = %e, "Own presence query failed");
        }
        if let Err(e) = &partner {
            warn!(agent = %self.me.label, chat_id, error = %e, "Partner presence query failed");
        }

        let decision = decide(own.ok(), partner.ok(), || self.draw(chat_id, event_id));
        debug!(
            agent = %self.me.label,
            chat_id,
            event_id,
            act = decision.act,
            basis = %decision.basis,
            "Duty arbitrated"
        );
        decision
    }

    fn draw(&self, chat_id: ChatId, event_id: MessageId) -> Arbitration {
        match self.policy {
            DutyPolicy::Independent => Arbitration {
                act: self.rng.lock().gen_bool(0.5),
                basis: Basis::CoinFlip,
            },
            DutyPolicy::EventKeyed { epoch } => Arbitration {
                act: keyed_pick(chat_id, event_id, epoch) == self.me.label,
                basis: Basis::EventKeyed,
            },
        }
    }
}
