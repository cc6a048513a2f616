//! Persistence collaborator for the FleetOps state engine.
//!
//! The engine treats storage as an external system: it reads records,
//! computes the next state, and writes it back with a compare-and-set on
//! the status it read. Two implementations are provided:
//!
//! - [`MemoryStore`]: process-local maps, for tests and ephemeral nodes
//! - [`SqliteStore`]: durable SQLite file (feature `sqlite`, on by default)
//!
//! Both mirror the cross-record invariants (one open shift per driver, one
//! active assignment per vehicle, one trip in progress per shift) as
//! uniqueness rules, so a bug above this layer surfaces as
//! [`StoreError::UniqueViolation`] instead of corrupt state.

pub mod error;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use fleetops_core::{DriverId, ShiftId, TripId, VehicleId};
use fleetops_domain::{
    Shift, ShiftStatus, Trip, TripStatus, VehicleAssignment, VerificationRecord,
    VerificationStatus,
};

/// CRUD and conditional-update operations over the fleet records.
///
/// Every `update_*` is a compare-and-set: it fails with
/// [`StoreError::StaleWrite`] when the stored status no longer matches the
/// status the caller read.
pub trait FleetStore: Send + Sync {
    // Shifts
    fn insert_shift(&self, shift: &Shift) -> StoreResult<()>;
    fn get_shift(&self, id: &ShiftId) -> StoreResult<Option<Shift>>;
    fn update_shift(
        &self,
        shift: &Shift,
        expected_status: ShiftStatus,
        expected_verification: VerificationStatus,
    ) -> StoreResult<()>;
    /// The driver's non-Closed shift, if any.
    fn open_shift_for_driver(&self, driver_id: &DriverId) -> StoreResult<Option<Shift>>;
    /// Every non-Closed shift.
    fn open_shifts(&self) -> StoreResult<Vec<Shift>>;

    // Vehicle assignments
    fn insert_assignment(&self, assignment: &VehicleAssignment) -> StoreResult<()>;
    /// Persist a deactivated assignment; fails if it was already inactive.
    fn release_assignment(&self, assignment: &VehicleAssignment) -> StoreResult<()>;
    fn active_assignment_for_vehicle(
        &self,
        vehicle_id: &VehicleId,
    ) -> StoreResult<Option<VehicleAssignment>>;
    fn active_assignment_for_shift(
        &self,
        shift_id: &ShiftId,
    ) -> StoreResult<Option<VehicleAssignment>>;
    fn active_assignments(&self) -> StoreResult<Vec<VehicleAssignment>>;

    // Trips
    fn insert_trip(&self, trip: &Trip) -> StoreResult<()>;
    fn get_trip(&self, id: &TripId) -> StoreResult<Option<Trip>>;
    fn update_trip(&self, trip: &Trip, expected_status: TripStatus) -> StoreResult<()>;
    fn trips_for_shift(&self, shift_id: &ShiftId) -> StoreResult<Vec<Trip>>;
    fn trips_for_driver(&self, driver_id: &DriverId) -> StoreResult<Vec<Trip>>;
    fn in_progress_trip_for_shift(&self, shift_id: &ShiftId) -> StoreResult<Option<Trip>>;

    // Verification attempts
    fn insert_verification(&self, record: &VerificationRecord) -> StoreResult<()>;
    fn update_verification(
        &self,
        record: &VerificationRecord,
        expected_status: VerificationStatus,
    ) -> StoreResult<()>;
    /// Most recent attempt for a shift.
    fn latest_verification(&self, shift_id: &ShiftId) -> StoreResult<Option<VerificationRecord>>;
    /// All attempts for a shift, oldest first.
    fn verifications_for_shift(&self, shift_id: &ShiftId) -> StoreResult<Vec<VerificationRecord>>;
}
