//! Resource Lock Manager
//!
//! "At most one live holder per resource key." Keys are namespaced
//! strings: `driver:<id>` for clock-in exclusivity and `vehicle:<id>` for
//! vehicle check-in.
//!
//! # Lifetime
//!
//! A lock lives as long as the entity holding it, not the connection that
//! asked for it. The authoritative representation is the store: a driver
//! key is held iff the driver has a non-closed shift, a vehicle key iff an
//! active assignment references the vehicle. [`LockManager::recover`]
//! rebuilds the in-memory table from those rows at start-up.
//!
//! `acquire` never waits. A busy key is reported as `None`, which callers
//! turn into a business-rule error.

use fleetops_core::{time::now_ms, DriverId, ShiftId, VehicleId};
use fleetops_store::{FleetStore, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Proof of holding a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockToken {
    /// Resource key
    pub key: String,
    /// Shift on whose behalf the key is held
    pub owner: ShiftId,
    /// Acquisition time (Unix epoch milliseconds)
    pub acquired_at: u64,
}

/// Exclusivity table.
#[derive(Debug, Default)]
pub struct LockManager {
    held: Mutex<HashMap<String, LockToken>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key guarding a driver's single open shift.
    pub fn driver_key(driver_id: &DriverId) -> String {
        format!("driver:{}", driver_id)
    }

    /// Key guarding a vehicle's single active assignment.
    pub fn vehicle_key(vehicle_id: &VehicleId) -> String {
        format!("vehicle:{}", vehicle_id)
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, LockToken>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take `key` for `owner` if nobody holds it.
    pub fn acquire(&self, key: &str, owner: &ShiftId) -> Option<LockToken> {
        let mut held = self.table();
        if let Some(holder) = held.get(key) {
            debug!(key, holder = %holder.owner, "Lock busy");
            return None;
        }
        let token = LockToken {
            key: key.to_string(),
            owner: owner.clone(),
            acquired_at: now_ms(),
        };
        held.insert(key.to_string(), token.clone());
        Some(token)
    }

    /// Free `key`. Releasing a free key is a no-op; returns whether a
    /// holder was removed.
    pub fn release(&self, key: &str) -> bool {
        self.table().remove(key).is_some()
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.table().contains_key(key)
    }

    /// Current holder of `key`.
    pub fn holder(&self, key: &str) -> Option<LockToken> {
        self.table().get(key).cloned()
    }

    /// Every held key, sorted.
    pub fn held_keys(&self) -> Vec<LockToken> {
        let mut tokens: Vec<LockToken> = self.table().values().cloned().collect();
        tokens.sort_by(|a, b| a.key.cmp(&b.key));
        tokens
    }

    /// Replace the table with what the store says is held.
    ///
    /// Returns the number of keys now held.
    pub fn recover(&self, store: &dyn FleetStore) -> StoreResult<usize> {
        let shifts = store.open_shifts()?;
        let assignments = store.active_assignments()?;
        let now = now_ms();

        let mut recovered = HashMap::with_capacity(shifts.len() + assignments.len());
        for shift in shifts {
            let key = Self::driver_key(&shift.driver_id);
            recovered.insert(
                key.clone(),
                LockToken {
                    key,
                    owner: shift.id,
                    acquired_at: now,
                },
            );
        }
        for assignment in assignments {
            let key = Self::vehicle_key(&assignment.vehicle_id);
            recovered.insert(
                key.clone(),
                LockToken {
                    key,
                    owner: assignment.shift_id,
                    acquired_at: now,
                },
            );
        }

        let count = recovered.len();
        *self.table() = recovered;
        info!(held = count, "Recovered locks from store");
        Ok(count)
    }
}
