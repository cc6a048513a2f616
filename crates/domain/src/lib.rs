//! Domain module for the FleetOps state engine
//!
//! This crate contains pure domain logic with no I/O dependencies:
//! - Shift, vehicle assignment, trip and verification records
//! - Status enums with exhaustive transition tables
//! - Record-level transition methods that refuse illegal moves
//!
//! Cross-record invariants (one open shift per driver, one active
//! assignment per vehicle, one trip in progress per shift) are enforced by
//! the engine; this crate only guarantees each record's own state machine.

pub mod actor;
pub mod assignment;
pub mod error;
pub mod shift;
pub mod trip;
pub mod verification;

pub use actor::Actor;
pub use assignment::VehicleAssignment;
pub use error::{DomainError, Result};
pub use shift::{Shift, ShiftStatus};
pub use trip::{Location, Passenger, Trip, TripDetails, TripStatus};
pub use verification::{
    AdminDecision, DecisionSource, VerificationOutcome, VerificationRecord, VerificationStatus,
};

/// Trim a reason and reject it when nothing is left.
pub fn require_reason(reason: &str, what: &str) -> Result<String> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(DomainError::ReasonRequired(what.to_string()));
    }
    Ok(trimmed.to_string())
}
