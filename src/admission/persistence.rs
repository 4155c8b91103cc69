//! Sled-backed admission registry.
//!
//! Expiry uses sled's compare-and-swap so that an entry is only deleted if it
//! is byte-for-byte the entry that was checked against the deadline. A
//! concurrent verification or re-join makes the swap fail and the check is
//! re-evaluated against the new state.

use super::registry::{AdmissionRegistry, ExpiryCheck, PendingAdmission};
use crate::error::StorageError;
use crate::types::AdmissionKey;
use std::path::Path;
use tracing::debug;

const TREE_NAME: &str = "pending_admissions";

/// Open (or create) the sled database at `path`, creating parent directories.
///
/// The registry and the chat settings live in separate trees of this database.
pub fn open_db<P: AsRef<Path>>(path: P) -> Result<sled::Db, StorageError> {
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(sled::open(path.as_ref())?)
}

/// Persistent registry shared by every agent that opens the same database
pub struct SledAdmissionRegistry {
    tree: sled::Tree,
}

impl SledAdmissionRegistry {
    /// Open (or create) the registry database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        Self::from_db(&open_db(path)?)
    }

    pub fn from_db(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            tree: db.open_tree(TREE_NAME)?,
        })
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.tree.flush()?;
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<PendingAdmission, StorageError> {
        Ok(bincode::deserialize(bytes)?)
    }

    fn encode(pending: &PendingAdmission) -> Result<Vec<u8>, StorageError> {
        Ok(bincode::serialize(pending)?)
    }
}

impl AdmissionRegistry for SledAdmissionRegistry {
    fn insert(
        &self,
        pending: PendingAdmission,
    ) -> Result<Option<PendingAdmission>, StorageError> {
        let key = pending.key().to_bytes();
        let previous = self.tree.insert(key, Self::encode(&pending)?)?;
        previous.map(|bytes| Self::decode(&bytes)).transpose()
    }

    fn get(&self, key: &AdmissionKey) -> Result<Option<PendingAdmission>, StorageError> {
        self.tree
            .get(key.to_bytes())?
            .map(|bytes| Self::decode(&bytes))
            .transpose()
    }

    fn remove(&self, key: &AdmissionKey) -> Result<Option<PendingAdmission>, StorageError> {
        self.tree
            .remove(key.to_bytes())?
            .map(|bytes| Self::decode(&bytes))
            .transpose()
    }

    fn remove_if_due(&self, key: &AdmissionKey, now_ms: i64) -> Result<ExpiryCheck, StorageError> {
        let raw_key = key.to_bytes();
        loop {
            let Some(current) = self.tree.get(raw_key)? else {
                return Ok(ExpiryCheck::Absent);
            };
            let pending = Self::decode(&current)?;
            if !pending.is_due(now_ms) {
                return Ok(ExpiryCheck::NotDue(pending));
            }
            match self
                .tree
                .compare_and_swap(raw_key, Some(&current), None::<&[u8]>)?
            {
                Ok(()) => return Ok(ExpiryCheck::Removed(pending)),
                Err(_) => {
                    debug!(key = %key, "Pending admission changed during expiry check, re-reading");
                    continue;
                }
            }
        }
    }

    fn list(&self) -> Result<Vec<PendingAdmission>, StorageError> {
        let mut all = Vec::new();
        for item in self.tree.iter() {
            let (_, value) = item?;
            all.push(Self::decode(&value)?);
        }
        all.sort_by_key(|p| p.key());
        Ok(all)
    }
}
