//! Duet: two-agent group chat moderation
//!
//! Two independently running bot agents watch the same chats. For each
//! moderation-relevant event a duty arbiter decides, without the agents
//! talking to each other, whether this agent acts. New members are restricted
//! until they answer a one-tap challenge and are removed if the deadline
//! passes first.

pub mod admission;
pub mod agent;
pub mod arbiter;
pub mod clock;
pub mod concurrency;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod gateway;
pub mod logging;
pub mod moderation;
pub mod presence;
pub mod runtime;
pub mod tooling;
pub mod types;
