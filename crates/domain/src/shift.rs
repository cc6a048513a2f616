//! Shift lifecycle.
//!
//! # State Transitions
//!
//! ```text
//! PendingVerification
//!     ↓ (activate: verified + vehicle attached)
//! Active
//!     ↓ (close)
//! Closed
//! ```
//!
//! `PendingVerification` may also close directly. `Closed` is terminal and
//! no transition ever reverses.

use crate::actor::Actor;
use crate::error::{DomainError, Result};
use crate::verification::VerificationStatus;
use fleetops_core::{DriverId, ShiftId, VehicleId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShiftStatus {
    /// Clocked in, waiting on identity verification and vehicle check-in
    PendingVerification,
    /// On duty
    Active,
    /// Finished, by the driver or by admin override
    Closed,
}

impl ShiftStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [ShiftStatus; 3] = [
        ShiftStatus::PendingVerification,
        ShiftStatus::Active,
        ShiftStatus::Closed,
    ];

    /// Transition table.
    pub fn can_transition_to(self, next: ShiftStatus) -> bool {
        use ShiftStatus::*;
        matches!(
            (self, next),
            (PendingVerification, Active) | (PendingVerification, Closed) | (Active, Closed)
        )
    }

    /// Open shifts hold their driver's exclusivity lock.
    pub fn is_open(self) -> bool {
        !matches!(self, ShiftStatus::Closed)
    }

    /// Stable storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            ShiftStatus::PendingVerification => "pending_verification",
            ShiftStatus::Active => "active",
            ShiftStatus::Closed => "closed",
        }
    }

    /// Inverse of [`ShiftStatus::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

impl fmt::Display for ShiftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A driver's bounded period of duty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shift {
    /// Shift identifier
    pub id: ShiftId,
    /// Owning driver
    pub driver_id: DriverId,
    /// Vehicle checked in for this shift, if any
    pub vehicle_id: Option<VehicleId>,
    /// Lifecycle status
    pub status: ShiftStatus,
    /// Biometric gate sub-state, meaningful while pending
    pub verification_status: VerificationStatus,
    /// Clock-in time
    pub created_at: u64,
    /// Set on entering `Active`
    pub started_at: Option<u64>,
    /// Set on entering `Closed`
    pub closed_at: Option<u64>,
    /// Free-text close reason
    pub close_reason: Option<String>,
    /// Who closed the shift
    pub closed_by: Option<Actor>,
}

impl Shift {
    /// A freshly clocked-in shift.
    pub fn new(driver_id: DriverId, now: u64) -> Self {
        Self {
            id: ShiftId::generate(),
            driver_id,
            vehicle_id: None,
            status: ShiftStatus::PendingVerification,
            verification_status: VerificationStatus::Unverified,
            created_at: now,
            started_at: None,
            closed_at: None,
            close_reason: None,
            closed_by: None,
        }
    }

    /// Whether the shift still holds its driver lock.
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    fn check_transition(&self, next: ShiftStatus) -> Result<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition {
                entity: "shift",
                from: self.status.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// PendingVerification → Active.
    ///
    /// Only the record's own state is checked here; verification and
    /// vehicle preconditions belong to the caller.
    pub fn activate(&mut self, now: u64) -> Result<()> {
        self.check_transition(ShiftStatus::Active)?;
        self.status = ShiftStatus::Active;
        self.started_at = Some(now);
        Ok(())
    }

    /// PendingVerification | Active → Closed.
    pub fn close(&mut self, reason: Option<String>, closed_by: Actor, now: u64) -> Result<()> {
        self.check_transition(ShiftStatus::Closed)?;
        self.status = ShiftStatus::Closed;
        self.closed_at = Some(now);
        self.close_reason = reason;
        self.closed_by = Some(closed_by);
        Ok(())
    }
}
