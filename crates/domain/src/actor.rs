//! Who requested a transition.

use fleetops_core::{AdminId, DriverId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Initiator of a close or cancel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "lowercase")]
pub enum Actor {
    /// The driver owning the shift or trip
    Driver(DriverId),
    /// An admin or dispatcher acting on someone else's record
    Admin(AdminId),
    /// The engine itself (cascading transitions)
    System,
}

impl Actor {
    /// Whether this is an admin override.
    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin(_))
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Driver(id) => write!(f, "driver:{}", id),
            Actor::Admin(id) => write!(f, "admin:{}", id),
            Actor::System => f.write_str("system"),
        }
    }
}
