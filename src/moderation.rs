//! Moderation actions: anti-link filtering and admin commands.
//!
//! Commands are parsed from [`InboundEvent::Command`](crate::event::InboundEvent)
//! fields and executed against the agent's gateway. Whether an agent executes a
//! command at all is decided by the coordinator.

use crate::clock::{datetime_from_ms, Clock};
use crate::error::{ApiError, StorageError};
use crate::event::{escape_html, ChatUser};
use crate::gateway::{kick_member, MessagingGateway, PermissionSet};
use crate::types::{ChatId, UserId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::num::IntErrorKind;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Substrings that mark a message as carrying a link
pub const LINK_PATTERNS: [&str; 4] = ["http://", "https://", "t.me/", "discord.gg/"];

pub fn contains_link(text: &str) -> bool {
    let lowered = text.to_lowercase();
    LINK_PATTERNS.iter().any(|p| lowered.contains(p))
}

/// Longest mute the platform treats as temporary; anything above is refused
pub const MAX_MUTE: Duration = Duration::from_secs(366 * 24 * 60 * 60);

const SETTINGS_TREE: &str = "chat_settings";

/// Per-chat moderation settings shared by both agents.
///
/// When opened over a sled database every change is written through to the
/// `chat_settings` tree, so toggles survive a restart.
#[derive(Debug)]
pub struct ChatSettings {
    default_anti_link: bool,
    anti_link: RwLock<HashMap<ChatId, bool>>,
    tree: Option<sled::Tree>,
}

impl ChatSettings {
    /// Settings held in memory only
    pub fn new(default_anti_link: bool) -> Self {
        Self {
            default_anti_link,
            anti_link: RwLock::new(HashMap::new()),
            tree: None,
        }
    }

    /// Settings backed by `db`, with stored values loaded up front
    pub fn open(db: &sled::Db, default_anti_link: bool) -> Result<Self, StorageError> {
        let tree = db.open_tree(SETTINGS_TREE)?;
        let mut anti_link = HashMap::new();
        for item in tree.iter() {
            let (key, value) = item?;
            match <[u8; 8]>::try_from(key.as_ref()) {
                Ok(raw) => {
                    anti_link.insert(i64::from_be_bytes(raw), value.first() == Some(&1));
                }
                Err(_) => warn!(len = key.len(), "Skipping malformed chat settings key"),
            }
        }
        debug!(chats = anti_link.len(), "Loaded chat settings");
        Ok(Self {
            default_anti_link,
            anti_link: RwLock::new(anti_link),
            tree: Some(tree),
        })
    }

    pub fn anti_link_enabled(&self, chat_id: ChatId) -> bool {
        self.anti_link
            .read()
            .get(&chat_id)
            .copied()
            .unwrap_or(self.default_anti_link)
    }

    pub fn set_anti_link(&self, chat_id: ChatId, enabled: bool) -> Result<(), StorageError> {
        let mut map = self.anti_link.write();
        self.persist(chat_id, enabled)?;
        map.insert(chat_id, enabled);
        Ok(())
    }

    /// Flip the setting and return the new value
    pub fn toggle_anti_link(&self, chat_id: ChatId) -> Result<bool, StorageError> {
        let mut map = self.anti_link.write();
        let next = !map.get(&chat_id).copied().unwrap_or(self.default_anti_link);
        self.persist(chat_id, next)?;
        map.insert(chat_id, next);
        Ok(next)
    }

    fn persist(&self, chat_id: ChatId, enabled: bool) -> Result<(), StorageError> {
        if let Some(tree) = &self.tree {
            tree.insert(chat_id.to_be_bytes(), &[enabled as u8])?;
            tree.flush()?;
        }
        Ok(())
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self::new(true)
    }
}

/// User a command acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Author of the replied-to message
    User(ChatUser),
    /// Bare numeric id from the arguments
    Id(UserId),
}

impl Target {
    pub fn id(&self) -> UserId {
        match self {
            Target::User(user) => user.id,
            Target::Id(id) => *id,
        }
    }

    /// Name for reply texts, HTML-escaped
    pub fn display(&self) -> String {
        match self {
            Target::User(user) => escape_html(&user.first_name),
            Target::Id(id) => id.to_string(),
        }
    }
}

/// Malformed command; the message is shown to the sender
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct UsageError(pub &'static str);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationCommand {
    Ban { target: Target },
    Unban { user_id: UserId },
    Kick { target: Target },
    Mute { target: Target, duration: Option<Duration> },
    Unmute { target: Target },
    /// `None` flips the current setting
    AntiLink { enabled: Option<bool> },
    Alive,
}

impl ModerationCommand {
    /// Parse a command by name. Unknown names yield `Ok(None)`.
    pub fn parse(
        name: &str,
        args: &[String],
        reply_to: Option<&ChatUser>,
    ) -> Result<Option<Self>, UsageError> {
        let command = match name {
            "ban" => ModerationCommand::Ban {
                target: target_from(reply_to, args)
                    .ok_or(UsageError("Usage: reply to a user or /ban <user_id>"))?,
            },
            "unban" => ModerationCommand::Unban {
                user_id: args
                    .first()
                    .and_then(|a| a.parse().ok())
                    .ok_or(UsageError("Usage: /unban <user_id>"))?,
            },
            "kick" => ModerationCommand::Kick {
                target: target_from(reply_to, args)
                    .ok_or(UsageError("Usage: reply to a user or /kick <user_id>"))?,
            },
            "mute" => {
                let target = target_from(reply_to, args)
                    .ok_or(UsageError("Reply to user or /mute <user_id> [seconds]"))?;
                // Seconds follow the id, or come first when replying
                let seconds_at = if reply_to.is_some() { 0 } else { 1 };
                let duration = match args.get(seconds_at).map(|a| a.parse::<u64>()) {
                    Some(Ok(secs)) if secs > MAX_MUTE.as_secs() => {
                        return Err(UsageError("Mute duration can be at most 366 days"))
                    }
                    Some(Err(e)) if *e.kind() == IntErrorKind::PosOverflow => {
                        return Err(UsageError("Mute duration can be at most 366 days"))
                    }
                    Some(Ok(secs)) if secs > 0 => Some(Duration::from_secs(secs)),
                    _ => None,
                };
                ModerationCommand::Mute { target, duration }
            }
            "unmute" => ModerationCommand::Unmute {
                target: target_from(reply_to, args)
                    .ok_or(UsageError("Reply to user or /unmute <user_id>"))?,
            },
            "antilink" | "toggle_antilink" => {
                let enabled = match args.first().map(|a| a.to_lowercase()) {
                    None => None,
                    Some(arg) if arg == "on" => Some(true),
                    Some(arg) if arg == "off" => Some(false),
                    Some(_) => return Err(UsageError("Usage: /antilink [on|off]")),
                };
                ModerationCommand::AntiLink { enabled }
            }
            "alive" => ModerationCommand::Alive,
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    /// Whether only admins or the owner may issue this command
    pub fn requires_privilege(&self) -> bool {
        !matches!(self, ModerationCommand::Alive)
    }

    /// Whether exactly one agent should carry this out
    pub fn requires_arbitration(&self) -> bool {
        !matches!(self, ModerationCommand::Alive)
    }

    /// Carry out the command and return the reply text
    pub async fn execute(
        &self,
        gateway: &dyn MessagingGateway,
        clock: &dyn Clock,
        settings: &ChatSettings,
        chat_id: ChatId,
        agent_name: &str,
    ) -> Result<String, ApiError> {
        match self {
            ModerationCommand::Ban { target } => {
                gateway.ban_member(chat_id, target.id()).await?;
                Ok(format!("🚫 Banned <b>{}</b>", target.display()))
            }
            ModerationCommand::Unban { user_id } => {
                gateway.unban_member(chat_id, *user_id).await?;
                Ok("✅ Unbanned.".to_string())
            }
            ModerationCommand::Kick { target } => {
                kick_member(gateway, chat_id, target.id()).await?;
                Ok(format!("👢 Kicked {}", target.display()))
            }
            ModerationCommand::Mute { target, duration } => {
                let until = match duration {
                    Some(d) => Some(mute_expiry(clock, *d).ok_or_else(|| {
                        ApiError::InvalidCommand(format!(
                            "mute of {}s is out of range",
                            d.as_secs()
                        ))
                    })?),
                    None => None,
                };
                gateway
                    .restrict_member(chat_id, target.id(), &PermissionSet::restricted(), until)
                    .await?;
                Ok(match duration {
                    Some(d) => format!("🔇 Muted {} for {}s", target.display(), d.as_secs()),
                    None => format!("🔇 Muted {}", target.display()),
                })
            }
            ModerationCommand::Unmute { target } => {
                gateway
                    .restrict_member(chat_id, target.id(), &PermissionSet::full(), None)
                    .await?;
                Ok(format!("🔊 Unmuted {}", target.display()))
            }
            ModerationCommand::AntiLink { enabled } => {
                let now_on = match enabled {
                    Some(value) => {
                        settings.set_anti_link(chat_id, *value)?;
                        *value
                    }
                    None => settings.toggle_anti_link(chat_id)?,
                };
                debug!(chat_id, anti_link = now_on, "Anti-link setting changed");
                Ok(format!("Anti-link set to: {}", if now_on { "ON" } else { "OFF" }))
            }
            ModerationCommand::Alive => Ok(format!("{} is online ✅", escape_html(agent_name))),
        }
    }
}

/// Wall-clock end of a mute, or `None` if it does not fit a timestamp
fn mute_expiry(clock: &dyn Clock, duration: Duration) -> Option<DateTime<Utc>> {
    if duration > MAX_MUTE {
        return None;
    }
    let millis = i64::try_from(duration.as_millis()).ok()?;
    datetime_from_ms(clock.now_ms().checked_add(millis)?)
}

fn target_from(reply_to: Option<&ChatUser>, args: &[String]) -> Option<Target> {
    match reply_to {
        Some(user) => Some(Target::User(user.clone())),
        None => args.first()?.parse().ok().map(Target::Id),
    }
}

/// Admins and the configured owner may moderate. Lookup failures deny.
pub async fn is_privileged(
    gateway: &dyn MessagingGateway,
    chat_id: ChatId,
    user_id: UserId,
    owner_id: Option<UserId>,
) -> bool {
    if owner_id == Some(user_id) {
        return true;
    }
    match gateway.get_membership_status(chat_id, user_id).await {
        Ok(status) => status.is_admin(),
        Err(e) => {
            debug!(chat_id, user_id, error = %e, "Admin lookup failed");
            false
        }
    }
}
