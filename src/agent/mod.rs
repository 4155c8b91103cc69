//! Agent identities
//!
//! Two cooperating agents share moderation duty over the same chats. Each agent
//! is known by a fixed label and by the platform user id the gateway reports
//! for its bot account at startup.

mod registry;

pub use registry::{AgentIdentity, AgentLabel, AgentRoster};
