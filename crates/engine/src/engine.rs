//! Engine wiring and read-side queries.

use crate::error::{EngineError, Result};
use crate::locks::LockManager;
use crate::serializer::{KeyGuard, KeyedSerializer};
use fleetops_core::{DomainEvent, DriverId, EngineConfig, EventSink, NullSink, ShiftId, TripId};
use fleetops_domain::{Shift, Trip, VehicleAssignment, VerificationRecord};
use fleetops_live::TrackingStream;
use fleetops_store::{FleetStore, StoreResult};
use fleetops_verification::{DriverProfiles, FaceMatcher, VerificationPolicy};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// The fleet operations state engine.
///
/// Owns the lock table and the per-key serializer; everything else is an
/// injected collaborator. Construct once per process.
pub struct FleetEngine {
    pub(crate) store: Arc<dyn FleetStore>,
    pub(crate) locks: LockManager,
    pub(crate) serializer: KeyedSerializer,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) policy: VerificationPolicy,
    pub(crate) matcher: Arc<dyn FaceMatcher>,
    pub(crate) profiles: Arc<dyn DriverProfiles>,
    pub(crate) tracking: Option<Arc<TrackingStream>>,
    pub(crate) config: EngineConfig,
}

impl FleetEngine {
    /// Engine with default policy, no event sink and no tracking stream.
    pub fn new(
        store: Arc<dyn FleetStore>,
        matcher: Arc<dyn FaceMatcher>,
        profiles: Arc<dyn DriverProfiles>,
    ) -> Self {
        Self {
            store,
            locks: LockManager::new(),
            serializer: KeyedSerializer::new(),
            events: Arc::new(NullSink),
            policy: VerificationPolicy::default(),
            matcher,
            profiles,
            tracking: None,
            config: EngineConfig::default(),
        }
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_policy(mut self, policy: VerificationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Forget a driver's live position when their shift closes.
    pub fn with_tracking(mut self, tracking: Arc<TrackingStream>) -> Self {
        self.tracking = Some(tracking);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Rebuild the lock table from the store. Call once at start-up.
    pub fn recover_locks(&self) -> Result<usize> {
        Ok(self.locks.recover(self.store.as_ref())?)
    }

    /// The lock table, for diagnostics.
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn store(&self) -> &Arc<dyn FleetStore> {
        &self.store
    }

    // --- queries -----------------------------------------------------------

    pub fn shift(&self, shift_id: &ShiftId) -> Result<Shift> {
        self.store
            .get_shift(shift_id)?
            .ok_or_else(|| EngineError::not_found("shift", shift_id))
    }

    /// The driver's open (pending or active) shift, if any.
    pub fn current_shift(&self, driver_id: &DriverId) -> Result<Option<Shift>> {
        Ok(self.store.open_shift_for_driver(driver_id)?)
    }

    pub fn trip(&self, trip_id: &TripId) -> Result<Trip> {
        self.store
            .get_trip(trip_id)?
            .ok_or_else(|| EngineError::not_found("trip", trip_id))
    }

    pub fn trips_for_shift(&self, shift_id: &ShiftId) -> Result<Vec<Trip>> {
        Ok(self.store.trips_for_shift(shift_id)?)
    }

    pub fn trips_for_driver(&self, driver_id: &DriverId) -> Result<Vec<Trip>> {
        Ok(self.store.trips_for_driver(driver_id)?)
    }

    /// The shift's active vehicle assignment, if any.
    pub fn active_assignment(&self, shift_id: &ShiftId) -> Result<Option<VehicleAssignment>> {
        Ok(self.store.active_assignment_for_shift(shift_id)?)
    }

    /// Every verification attempt for a shift, oldest first.
    pub fn verification_history(&self, shift_id: &ShiftId) -> Result<Vec<VerificationRecord>> {
        self.shift(shift_id)?;
        Ok(self.store.verifications_for_shift(shift_id)?)
    }

    // --- internals ---------------------------------------------------------

    pub(crate) async fn lock_shift(&self, shift_id: &ShiftId) -> KeyGuard<'_> {
        self.serializer.lock(format!("shift:{}", shift_id)).await
    }

    pub(crate) async fn lock_trip(&self, trip_id: &TripId) -> KeyGuard<'_> {
        self.serializer.lock(format!("trip:{}", trip_id)).await
    }

    /// Log the outcome of writing back a record whose transition could not
    /// be completed. Returns `false` when the store refused the write-back.
    pub(crate) fn undo(&self, what: &str, entity_id: &str, result: StoreResult<()>) -> bool {
        match result {
            Ok(()) => {
                warn!(entity_id, "Rolled back {}", what);
                true
            }
            Err(e) => {
                error!(entity_id, error = %e, "Failed to roll back {}", what);
                false
            }
        }
    }

    pub(crate) fn emit(&self, event: DomainEvent) {
        debug!(event_type = %event.event_type, entity_id = %event.entity_id, "Emitting event");
        self.events.publish(event);
    }
}
