//! Per-key serialization of state transitions.
//!
//! Transitions on the same shift (or trip) queue behind one another;
//! transitions on different keys run in parallel. Slots are created on
//! demand and dropped once nobody holds or waits on them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
struct Slot {
    mutex: Arc<AsyncMutex<()>>,
    /// Holders plus waiters
    users: usize,
}

/// Map of key -> async mutex.
#[derive(Debug, Default)]
pub struct KeyedSerializer {
    slots: Mutex<HashMap<String, Slot>>,
}

impl KeyedSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `key`.
    ///
    /// Dropping the returned future before it resolves gives the slot back.
    pub async fn lock(&self, key: impl Into<String>) -> KeyGuard<'_> {
        let key = key.into();
        let mutex = {
            let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
            let slot = slots.entry(key.clone()).or_default();
            slot.users += 1;
            Arc::clone(&slot.mutex)
        };
        let lease = SlotLease {
            serializer: self,
            key,
        };
        let guard = mutex.lock_owned().await;
        KeyGuard {
            guard: Some(guard),
            lease,
        }
    }

    /// Keys with a live slot.
    pub fn active_keys(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }
}

/// One user's claim on a slot, held while waiting and while locked.
#[derive(Debug)]
struct SlotLease<'a> {
    serializer: &'a KeyedSerializer,
    key: String,
}

impl Drop for SlotLease<'_> {
    fn drop(&mut self) {
        let mut slots = self
            .serializer
            .slots
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        let unused = match slots.get_mut(&self.key) {
            Some(slot) => {
                slot.users = slot.users.saturating_sub(1);
                slot.users == 0
            }
            None => false,
        };
        if unused {
            slots.remove(&self.key);
        }
    }
}

/// Exclusive use of one key until dropped.
#[derive(Debug)]
pub struct KeyGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    lease: SlotLease<'a>,
}

impl KeyGuard<'_> {
    pub fn key(&self) -> &str {
        &self.lease.key
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // Unlock before the lease gives up the slot
        self.guard.take();
    }
}
