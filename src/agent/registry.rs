//! Agent roster and identity types.

use crate::error::ApiError;
use crate::gateway::MessagingGateway;
use crate::types::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed label of one of the two agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentLabel {
    A,
    B,
}

impl AgentLabel {
    /// The label of the partner agent
    pub fn partner(self) -> AgentLabel {
        match self {
            AgentLabel::A => AgentLabel::B,
            AgentLabel::B => AgentLabel::A,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentLabel::A => "a",
            AgentLabel::B => "b",
        }
    }
}

impl fmt::Display for AgentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentLabel {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(AgentLabel::A),
            "b" => Ok(AgentLabel::B),
            other => Err(ApiError::ConfigError(format!(
                "Unknown agent label: {} (must be 'a' or 'b')",
                other
            ))),
        }
    }
}

/// Identity of one agent, fixed for the lifetime of the process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub label: AgentLabel,
    /// Platform user id of the agent's bot account
    pub platform_id: UserId,
    /// Display name used in replies
    pub name: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl AgentIdentity {
    pub fn new(label: AgentLabel, platform_id: UserId, name: impl Into<String>) -> Self {
        Self {
            label,
            platform_id,
            name: name.into(),
            username: None,
        }
    }

    /// Resolve an identity by asking the agent's own gateway who it is.
    ///
    /// Any failure here is fatal for startup.
    pub async fn resolve(
        label: AgentLabel,
        name: &str,
        gateway: &dyn MessagingGateway,
    ) -> Result<Self, ApiError> {
        let me = gateway.get_me().await.map_err(|e| {
            ApiError::ConfigError(format!("Could not resolve identity of agent {}: {}", label, e))
        })?;
        if !me.is_bot {
            return Err(ApiError::ConfigError(format!(
                "Agent {} token does not belong to a bot account (user {})",
                label, me.id
            )));
        }
        Ok(Self {
            label,
            platform_id: me.id,
            name: name.to_string(),
            username: me.username,
        })
    }
}

/// Both agent identities, looked up by label
#[derive(Debug, Clone)]
pub struct AgentRoster {
    a: AgentIdentity,
    b: AgentIdentity,
}

impl AgentRoster {
    pub fn new(a: AgentIdentity, b: AgentIdentity) -> Result<Self, ApiError> {
        if a.label != AgentLabel::A || b.label != AgentLabel::B {
            return Err(ApiError::ConfigError(format!(
                "Roster labels out of order: got {} and {}",
                a.label, b.label
            )));
        }
        if a.platform_id == b.platform_id {
            return Err(ApiError::ConfigError(format!(
                "Both agents resolved to the same platform account ({})",
                a.platform_id
            )));
        }
        Ok(Self { a, b })
    }

    pub fn get(&self, label: AgentLabel) -> &AgentIdentity {
        match label {
            AgentLabel::A => &self.a,
            AgentLabel::B => &self.b,
        }
    }

    pub fn partner_of(&self, label: AgentLabel) -> &AgentIdentity {
        self.get(label.partner())
    }

    /// Whether a platform user id belongs to either agent
    pub fn is_agent(&self, user_id: UserId) -> bool {
        self.a.platform_id == user_id || self.b.platform_id == user_id
    }
}
