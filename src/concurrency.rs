//! Per-admission mutual exclusion
//!
//! Serializes state transitions for the same (chat, user) inside one process,
//! so that a restriction, a permission restore and a kick for the same member
//! never interleave. Transitions on different keys run concurrently.
//!
//! Across processes the registry's atomic removal is what decides the winner;
//! these locks only order the gateway side effects that follow it.

use crate::types::AdmissionKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-key async lock manager
#[derive(Default)]
pub struct KeyLockManager {
    /// Uses Arc<AsyncMutex<()>> so a guard can be held across gateway calls
    locks: Mutex<HashMap<AdmissionKey, Arc<AsyncMutex<()>>>>,
}

impl KeyLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_key_lock(&self, key: &AdmissionKey) -> Arc<AsyncMutex<()>> {
        let mut map = self.locks.lock();
        map.entry(*key)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Wait for exclusive access to `key`
    pub async fn acquire(&self, key: &AdmissionKey) -> KeyGuard<'_> {
        let guard = self.get_key_lock(key).lock_owned().await;
        KeyGuard {
            manager: self,
            key: *key,
            guard: Some(guard),
        }
    }

    /// Number of keys with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the entry for `key` if nobody else holds or waits on it
    fn release(&self, key: &AdmissionKey) {
        let mut map = self.locks.lock();
        if let Some(lock) = map.get(key) {
            if Arc::strong_count(lock) == 1 {
                map.remove(key);
            }
        }
    }
}

/// Exclusive access to one admission key; released on drop
pub struct KeyGuard<'a> {
    manager: &'a KeyLockManager,
    key: AdmissionKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // Release the mutex first so the map entry's count reflects waiters only
        self.guard.take();
        self.manager.release(&self.key);
    }
}
