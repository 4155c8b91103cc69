//! Configuration
//!
//! Layered loading with the `config` crate: built-in defaults, then the global
//! file, then an explicit `--config` file, then `DUET__*` environment variables.

pub mod facade;
pub mod merge;
pub mod paths;
pub mod sources;

pub use facade::ConfigLoader;
pub use paths::xdg_root as xdg;

use crate::admission::AdmissionConfig;
use crate::agent::AgentLabel;
use crate::arbiter::DutyPolicy;
use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::types::UserId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const REDACTED: &str = "<redacted>";

/// Top-level duet configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuetConfig {
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub admission: AdmissionSettings,
    #[serde(default)]
    pub arbitration: ArbitrationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DuetConfig {
    /// Reject configurations the agents cannot start with
    pub fn validate(&self) -> Result<(), ApiError> {
        for label in [AgentLabel::A, AgentLabel::B] {
            if self.agents.get(label).token.trim().is_empty() {
                return Err(ApiError::ConfigError(format!(
                    "Missing bot token for agent {} (set agents.{}.token or DUET__AGENTS__{}__TOKEN)",
                    label,
                    label,
                    label.as_str().to_uppercase()
                )));
            }
        }
        if self.agents.a.token.trim() == self.agents.b.token.trim() {
            return Err(ApiError::ConfigError(
                "Both agents are configured with the same bot token".to_string(),
            ));
        }
        self.admission.to_admission_config().validate()?;
        if self.gateway.api_base.trim().is_empty() {
            return Err(ApiError::ConfigError("gateway.api_base is empty".to_string()));
        }
        Ok(())
    }

    /// Copy with bot tokens masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for agent in [&mut copy.agents.a, &mut copy.agents.b] {
            if !agent.token.is_empty() {
                agent.token = REDACTED.to_string();
            }
        }
        copy
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default)]
    pub a: AgentConfig,
    #[serde(default)]
    pub b: AgentConfig,
}

impl AgentsConfig {
    pub fn get(&self, label: AgentLabel) -> &AgentConfig {
        match label {
            AgentLabel::A => &self.a,
            AgentLabel::B => &self.b,
        }
    }
}

/// One agent's bot account
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Bot API token
    #[serde(default)]
    pub token: String,
    /// Display name used in replies
    #[serde(default)]
    pub name: Option<String>,
}

impl AgentConfig {
    pub fn display_name(&self, label: AgentLabel) -> String {
        self.name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Agent {}", label.as_str().to_uppercase()))
    }
}

/// Messaging gateway client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bot API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Timeout for regular API calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Long-poll timeout for update fetching
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_poll_timeout_secs() -> u64 {
    30
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

/// Admission timing as configured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionSettings {
    /// Seconds a new member has to verify
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra milliseconds before the deadline check fires
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_grace_ms() -> u64 {
    1000
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            grace_ms: default_grace_ms(),
        }
    }
}

impl AdmissionSettings {
    pub fn to_admission_config(&self) -> AdmissionConfig {
        AdmissionConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            grace: Duration::from_millis(self.grace_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    Independent,
    EventKeyed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArbitrationConfig {
    #[serde(default)]
    pub policy: PolicyKind,
    /// Mixed into event-keyed draws; change it to reshuffle assignments
    #[serde(default)]
    pub epoch: u64,
}

impl ArbitrationConfig {
    pub fn duty_policy(&self) -> DutyPolicy {
        match self.policy {
            PolicyKind::Independent => DutyPolicy::Independent,
            PolicyKind::EventKeyed => DutyPolicy::EventKeyed { epoch: self.epoch },
        }
    }
}

/// Admission registry storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Sled database directory; None uses the platform data directory
    #[serde(default)]
    pub registry_path: Option<PathBuf>,
    /// Keep pending admissions in memory only
    #[serde(default)]
    pub in_memory: bool,
}

impl StorageConfig {
    pub fn resolve_registry_path(&self) -> Result<PathBuf, ApiError> {
        match &self.registry_path {
            Some(path) if !path.as_os_str().is_empty() => Ok(path.clone()),
            _ => xdg::default_registry_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Anti-link filtering for chats that never toggled it
    #[serde(default = "default_true")]
    pub anti_link: bool,
    /// Account allowed to moderate in every chat
    #[serde(default)]
    pub owner_id: Option<UserId>,
}

fn default_true() -> bool {
    true
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            anti_link: true,
            owner_id: None,
        }
    }
}
