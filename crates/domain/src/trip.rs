//! Trip lifecycle.
//!
//! ```text
//! ASSIGNED ──start──► IN_PROGRESS ──complete──► COMPLETED
//!     │                    │
//!     └──────cancel────────┴──────────────────► CANCELLED
//! ```

use crate::actor::Actor;
use crate::error::{DomainError, Result};
use fleetops_core::{DriverId, ShiftId, TripId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl TripStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [TripStatus; 4] = [
        TripStatus::Assigned,
        TripStatus::InProgress,
        TripStatus::Completed,
        TripStatus::Cancelled,
    ];

    /// Transition table.
    pub fn can_transition_to(self, next: TripStatus) -> bool {
        use TripStatus::*;
        matches!(
            (self, next),
            (Assigned, InProgress)
                | (Assigned, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TripStatus::Assigned => "ASSIGNED",
            TripStatus::InProgress => "IN_PROGRESS",
            TripStatus::Completed => "COMPLETED",
            TripStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pickup or dropoff descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Human-readable address or landmark
    pub address: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl Location {
    pub fn address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            lat: None,
            lng: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Passenger {
    pub name: String,
    pub phone: String,
    pub pickup_note: Option<String>,
    pub bag_count: u32,
}

/// What dispatch supplies when assigning a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripDetails {
    pub pickup: Location,
    pub dropoff: Location,
    /// Fare in minor currency units
    pub price_cents: u64,
    /// Planned pickup time, if scheduled
    pub scheduled_at: Option<u64>,
    #[serde(default)]
    pub passengers: Vec<Passenger>,
}

impl TripDetails {
    pub fn validate(&self) -> Result<()> {
        if self.pickup.address.trim().is_empty() || self.dropoff.address.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "pickup and dropoff are required".to_string(),
            ));
        }
        if let Some(p) = self.passengers.iter().find(|p| p.name.trim().is_empty()) {
            return Err(DomainError::ValidationError(format!(
                "passenger with phone '{}' has no name",
                p.phone
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: TripId,
    pub driver_id: DriverId,
    /// Bound when the trip starts; a trip may be assigned before its
    /// driver has clocked in
    pub shift_id: Option<ShiftId>,
    pub details: TripDetails,
    pub status: TripStatus,
    pub created_at: u64,
    pub actual_start_time: Option<u64>,
    pub actual_end_time: Option<u64>,
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<Actor>,
}

impl Trip {
    pub fn new(driver_id: DriverId, details: TripDetails, now: u64) -> Self {
        Self {
            id: TripId::generate(),
            driver_id,
            shift_id: None,
            details,
            status: TripStatus::Assigned,
            created_at: now,
            actual_start_time: None,
            actual_end_time: None,
            cancel_reason: None,
            cancelled_by: None,
        }
    }

    fn check_transition(&self, next: TripStatus) -> Result<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition {
                entity: "trip",
                from: self.status.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// ASSIGNED → IN_PROGRESS, binding the trip to `shift_id`.
    pub fn start(&mut self, shift_id: ShiftId, now: u64) -> Result<()> {
        self.check_transition(TripStatus::InProgress)?;
        self.status = TripStatus::InProgress;
        self.shift_id = Some(shift_id);
        self.actual_start_time = Some(now);
        Ok(())
    }

    /// IN_PROGRESS → COMPLETED.
    pub fn complete(&mut self, now: u64) -> Result<()> {
        self.check_transition(TripStatus::Completed)?;
        self.status = TripStatus::Completed;
        self.actual_end_time = Some(now);
        Ok(())
    }

    /// ASSIGNED | IN_PROGRESS → CANCELLED.
    pub fn cancel(&mut self, reason: &str, cancelled_by: Actor, now: u64) -> Result<()> {
        let reason = crate::require_reason(reason, "cancel a trip")?;
        self.check_transition(TripStatus::Cancelled)?;
        if self.status == TripStatus::InProgress {
            self.actual_end_time = Some(now);
        }
        self.status = TripStatus::Cancelled;
        self.cancel_reason = Some(reason);
        self.cancelled_by = Some(cancelled_by);
        Ok(())
    }
}
