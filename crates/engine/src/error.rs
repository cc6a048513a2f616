//! Engine errors.
//!
//! Every error carries a stable wire code and one of five kinds. All of
//! them leave authoritative state unchanged.

use fleetops_core::{DriverId, ShiftId, TripId, VehicleId};
use fleetops_domain::{DomainError, ShiftStatus, VerificationStatus};
use fleetops_store::StoreError;
use fleetops_verification::ProfileError;
use std::fmt;
use thiserror::Error;

/// Error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Lost a race for a resource; retry after re-reading state
    Conflict,
    /// Record is in the wrong state for the requested transition
    Precondition,
    /// Input rejected before any state was touched
    Validation,
    /// Referenced record does not exist
    NotFound,
    /// Collaborator failure
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Conflict => "conflict",
            ErrorKind::Precondition => "precondition",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Driver {0} already has an active shift")]
    DriverHasActiveShift(DriverId),

    #[error("Vehicle {0} is already assigned")]
    VehicleAlreadyAssigned(VehicleId),

    #[error("Shift {0} already has a vehicle attached")]
    VehicleAlreadyAttached(ShiftId),

    #[error("Verification for shift {0} is no longer awaiting review")]
    StaleVerification(ShiftId),

    #[error("Shift {shift_id} already has trip {trip_id} in progress")]
    TripAlreadyInProgress { shift_id: ShiftId, trip_id: TripId },

    #[error("Shift {shift_id} is not verified (verification is {status})")]
    VerificationIncomplete {
        shift_id: ShiftId,
        status: VerificationStatus,
    },

    #[error("Shift {0} has no vehicle assigned")]
    NoVehicleAssigned(ShiftId),

    #[error("Shift {0} is already closed")]
    ShiftAlreadyClosed(ShiftId),

    #[error("Driver {0} has no active shift")]
    ShiftNotActive(DriverId),

    #[error("Shift {shift_id} does not accept a selfie ({status}, verification {verification})")]
    VerificationNotOpen {
        shift_id: ShiftId,
        status: ShiftStatus,
        verification: VerificationStatus,
    },

    #[error("Driver {0} has no enrolled reference photo")]
    ReferencePhotoMissing(DriverId),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("A non-empty reason is required to {0}")]
    ReasonRequired(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable code surfaced to clients.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::DriverHasActiveShift(_) => "DRIVER_HAS_ACTIVE_SHIFT",
            EngineError::VehicleAlreadyAssigned(_) => "VEHICLE_ALREADY_ASSIGNED",
            EngineError::VehicleAlreadyAttached(_) => "VEHICLE_ALREADY_ATTACHED",
            EngineError::StaleVerification(_) => "STALE_VERIFICATION",
            EngineError::TripAlreadyInProgress { .. } => "TRIP_ALREADY_IN_PROGRESS",
            EngineError::VerificationIncomplete { .. } => "VERIFICATION_INCOMPLETE",
            EngineError::NoVehicleAssigned(_) => "NO_VEHICLE_ASSIGNED",
            EngineError::ShiftAlreadyClosed(_) => "SHIFT_ALREADY_CLOSED",
            EngineError::ShiftNotActive(_) => "SHIFT_NOT_ACTIVE",
            EngineError::VerificationNotOpen { .. } => "VERIFICATION_NOT_OPEN",
            EngineError::ReferencePhotoMissing(_) => "REFERENCE_PHOTO_MISSING",
            EngineError::InvalidTransition(_) => "INVALID_TRANSITION",
            EngineError::ReasonRequired(_) => "REASON_REQUIRED",
            EngineError::Validation(_) => "VALIDATION_FAILED",
            EngineError::NotFound { .. } => "NOT_FOUND",
            EngineError::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            EngineError::Store(_) => "STORE_FAILURE",
            EngineError::Internal(_) => "INTERNAL",
        }
    }

    /// Taxonomy bucket.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::DriverHasActiveShift(_)
            | EngineError::VehicleAlreadyAssigned(_)
            | EngineError::VehicleAlreadyAttached(_)
            | EngineError::StaleVerification(_)
            | EngineError::TripAlreadyInProgress { .. }
            | EngineError::ConcurrentModification(_) => ErrorKind::Conflict,
            EngineError::VerificationIncomplete { .. }
            | EngineError::NoVehicleAssigned(_)
            | EngineError::ShiftAlreadyClosed(_)
            | EngineError::ShiftNotActive(_)
            | EngineError::VerificationNotOpen { .. }
            | EngineError::ReferencePhotoMissing(_)
            | EngineError::InvalidTransition(_) => ErrorKind::Precondition,
            EngineError::ReasonRequired(_) | EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Store(_) | EngineError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidTransition { .. } => EngineError::InvalidTransition(err.to_string()),
            DomainError::ReasonRequired(what) => EngineError::ReasonRequired(what),
            DomainError::ValidationError(msg) => EngineError::Validation(msg),
            DomainError::InvariantViolation(msg) => EngineError::Internal(msg),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            StoreError::StaleWrite { .. } | StoreError::UniqueViolation(_) => {
                EngineError::ConcurrentModification(err.to_string())
            }
            other => EngineError::Store(other),
        }
    }
}

impl From<ProfileError> for EngineError {
    fn from(err: ProfileError) -> Self {
        match err {
            ProfileError::UnknownDriver(id) => EngineError::NotFound { entity: "driver", id },
            ProfileError::Backend(msg) => EngineError::Internal(msg),
            ProfileError::InvalidEnrollment(msg) => EngineError::Validation(msg),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
