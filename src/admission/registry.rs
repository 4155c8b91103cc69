//! Admission Registry
//!
//! Table of users restricted pending verification, keyed by (chat, user).
//! Both agents read and write the same registry. Removal is always atomic per
//! key: whichever of verification or expiry removes an entry first wins, and
//! the other observes absence.

use crate::agent::AgentLabel;
use crate::clock::datetime_from_ms;
use crate::error::StorageError;
use crate::types::{AdmissionKey, ChatId, UserId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A user restricted from posting, awaiting a challenge response.
/// Immutable once created; a re-join replaces it with a fresh entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAdmission {
    pub chat_id: ChatId,
    pub user_id: UserId,
    /// Unix milliseconds after which the user may be expelled
    pub deadline_ms: i64,
    /// Agent that restricted the user and owns the deadline check
    pub admitted_by: AgentLabel,
}

impl PendingAdmission {
    pub fn key(&self) -> AdmissionKey {
        AdmissionKey::new(self.chat_id, self.user_id)
    }

    pub fn is_due(&self, now_ms: i64) -> bool {
        self.deadline_ms <= now_ms
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        datetime_from_ms(self.deadline_ms)
    }
}

/// Result of an atomic expiry check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryCheck {
    /// The entry was due and has been removed by this call
    Removed(PendingAdmission),
    /// The entry exists but its deadline is still ahead; left in place
    NotDue(PendingAdmission),
    /// No entry; already verified or expired elsewhere
    Absent,
}

/// Admission registry interface.
///
/// `remove` and `remove_if_due` must be atomic with respect to each other for
/// the same key, including across agents sharing the backing store.
pub trait AdmissionRegistry: Send + Sync {
    /// Insert or replace the entry for the admission's key; returns the replaced entry
    fn insert(&self, pending: PendingAdmission)
        -> Result<Option<PendingAdmission>, StorageError>;

    fn get(&self, key: &AdmissionKey) -> Result<Option<PendingAdmission>, StorageError>;

    /// Remove unconditionally; `None` if nothing was there
    fn remove(&self, key: &AdmissionKey) -> Result<Option<PendingAdmission>, StorageError>;

    /// Remove only if the entry exists and its deadline is `<= now_ms`
    fn remove_if_due(&self, key: &AdmissionKey, now_ms: i64) -> Result<ExpiryCheck, StorageError>;

    /// All pending admissions, ordered by key
    fn list(&self) -> Result<Vec<PendingAdmission>, StorageError>;
}

/// Process-local registry for a single process hosting both agents, and for tests
#[derive(Debug, Default)]
pub struct InMemoryAdmissionRegistry {
    entries: Mutex<HashMap<AdmissionKey, PendingAdmission>>,
}

impl InMemoryAdmissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AdmissionRegistry for InMemoryAdmissionRegistry {
    fn insert(
        &self,
        pending: PendingAdmission,
    ) -> Result<Option<PendingAdmission>, StorageError> {
        Ok(self.entries.lock().insert(pending.key(), pending))
    }

    fn get(&self, key: &AdmissionKey) -> Result<Option<PendingAdmission>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn remove(&self, key: &AdmissionKey) -> Result<Option<PendingAdmission>, StorageError> {
        Ok(self.entries.lock().remove(key))
    }

    fn remove_if_due(&self, key: &AdmissionKey, now_ms: i64) -> Result<ExpiryCheck, StorageError> {
        let mut entries = self.entries.lock();
        let check = match entries.get(key) {
            None => ExpiryCheck::Absent,
            Some(pending) if !pending.is_due(now_ms) => ExpiryCheck::NotDue(pending.clone()),
            Some(_) => match entries.remove(key) {
                Some(pending) => ExpiryCheck::Removed(pending),
                None => ExpiryCheck::Absent,
            },
        };
        Ok(check)
    }

    fn list(&self) -> Result<Vec<PendingAdmission>, StorageError> {
        let mut all: Vec<PendingAdmission> = self.entries.lock().values().cloned().collect();
        all.sort_by_key(|p| p.key());
        Ok(all)
    }
}
