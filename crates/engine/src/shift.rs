//! Shift State Machine
//!
//! # State Transitions
//!
//! ```text
//! StartShift ──► PendingVerification ──Activate──► Active
//!                        │                           │
//!                        └──────────Close────────────┴──► Closed
//! ```
//!
//! `Activate` needs both a VERIFIED gate and an active vehicle
//! assignment, obtained in either order. `Close` releases the driver and
//! vehicle locks and cancels a trip left in progress.

use crate::engine::FleetEngine;
use crate::error::{EngineError, Result};
use crate::locks::LockManager;
use fleetops_core::{event_types, time::now_ms, DriverId, EventBuilder, ShiftId, VehicleId};
use fleetops_domain::{
    require_reason, Actor, DomainError, Shift, ShiftStatus, Trip, TripStatus, VehicleAssignment,
    VerificationStatus,
};
use fleetops_store::StoreError;
use tracing::{debug, info, warn};

/// Reason recorded on a trip cancelled because its shift closed.
pub const SHIFT_CLOSED_REASON: &str = "shift closed";

impl FleetEngine {
    /// Clock a driver in.
    pub async fn start_shift(&self, driver_id: &DriverId) -> Result<Shift> {
        let key = LockManager::driver_key(driver_id);
        let _guard = self.serializer.lock(key.clone()).await;

        let shift = Shift::new(driver_id.clone(), now_ms());
        if self.locks.acquire(&key, &shift.id).is_none() {
            debug!(driver_id = %driver_id, "Start refused, driver already on shift");
            return Err(EngineError::DriverHasActiveShift(driver_id.clone()));
        }
        if let Err(e) = self.store.insert_shift(&shift) {
            self.locks.release(&key);
            return Err(match e {
                StoreError::UniqueViolation(_) => {
                    EngineError::DriverHasActiveShift(driver_id.clone())
                }
                other => other.into(),
            });
        }

        info!(shift_id = %shift.id, driver_id = %driver_id, "Shift started");
        self.emit(
            EventBuilder::new(event_types::SHIFT_STARTED, &shift.id)
                .to_driver(driver_id)
                .payload(&shift)
                .build(),
        );
        Ok(shift)
    }

    /// Check a vehicle in to a pending or active shift.
    pub async fn attach_vehicle(
        &self,
        shift_id: &ShiftId,
        vehicle_id: &VehicleId,
    ) -> Result<VehicleAssignment> {
        let _guard = self.lock_shift(shift_id).await;
        let shift = self.shift(shift_id)?;

        if shift.status == ShiftStatus::Closed {
            return Err(EngineError::ShiftAlreadyClosed(shift.id));
        }
        if self.store.active_assignment_for_shift(&shift.id)?.is_some() {
            return Err(EngineError::VehicleAlreadyAttached(shift.id));
        }

        let key = LockManager::vehicle_key(vehicle_id);
        if self.locks.acquire(&key, &shift.id).is_none() {
            debug!(shift_id = %shift.id, vehicle_id = %vehicle_id, "Vehicle busy");
            return Err(EngineError::VehicleAlreadyAssigned(vehicle_id.clone()));
        }

        let now = now_ms();
        let mut assignment =
            VehicleAssignment::new(vehicle_id.clone(), shift.id.clone(), shift.driver_id.clone(), now);
        if let Err(e) = self.store.insert_assignment(&assignment) {
            self.locks.release(&key);
            return Err(match e {
                StoreError::UniqueViolation(_) => {
                    EngineError::VehicleAlreadyAssigned(vehicle_id.clone())
                }
                other => other.into(),
            });
        }

        let mut updated = shift.clone();
        updated.vehicle_id = Some(vehicle_id.clone());
        if let Err(e) =
            self.store
                .update_shift(&updated, shift.status, shift.verification_status)
        {
            // Undo the assignment so the vehicle is not stranded. If that
            // fails too the row is still active, so the lock stays with it.
            let undone = assignment.release(now).is_ok()
                && self.undo(
                    "vehicle assignment",
                    assignment.id.as_str(),
                    self.store.release_assignment(&assignment),
                );
            if undone {
                self.locks.release(&key);
            }
            return Err(e.into());
        }

        info!(
            shift_id = %updated.id,
            driver_id = %updated.driver_id,
            vehicle_id = %vehicle_id,
            "Vehicle attached"
        );
        self.emit(
            EventBuilder::new(event_types::VEHICLE_ASSIGNED, &updated.id)
                .to_driver(&updated.driver_id)
                .payload(&assignment)
                .build(),
        );

        self.maybe_auto_activate(updated);
        Ok(assignment)
    }

    /// PendingVerification → Active.
    pub async fn activate(&self, shift_id: &ShiftId) -> Result<Shift> {
        let _guard = self.lock_shift(shift_id).await;
        let shift = self.shift(shift_id)?;
        self.activate_locked(shift)
    }

    /// Activation with the shift key already held.
    pub(crate) fn activate_locked(&self, mut shift: Shift) -> Result<Shift> {
        if shift.status != ShiftStatus::PendingVerification {
            return Err(DomainError::InvalidTransition {
                entity: "shift",
                from: shift.status.to_string(),
                to: ShiftStatus::Active.to_string(),
            }
            .into());
        }
        if shift.verification_status != VerificationStatus::Verified {
            return Err(EngineError::VerificationIncomplete {
                shift_id: shift.id,
                status: shift.verification_status,
            });
        }
        let vehicle_lock_held = match self.store.active_assignment_for_shift(&shift.id)? {
            Some(assignment) => self
                .locks
                .holder(&LockManager::vehicle_key(&assignment.vehicle_id))
                .map(|token| token.owner == shift.id)
                .unwrap_or(false),
            None => false,
        };
        if !vehicle_lock_held {
            return Err(EngineError::NoVehicleAssigned(shift.id));
        }

        let (expected_status, expected_verification) = (shift.status, shift.verification_status);
        shift.activate(now_ms())?;
        self.store
            .update_shift(&shift, expected_status, expected_verification)?;

        info!(shift_id = %shift.id, driver_id = %shift.driver_id, "Shift activated");
        self.emit(
            EventBuilder::new(event_types::SHIFT_ACTIVATED, &shift.id)
                .to_driver(&shift.driver_id)
                .payload(&shift)
                .build(),
        );
        Ok(shift)
    }

    /// Activate on the engine's own initiative when configured to and both
    /// preconditions hold. Never fails the calling operation.
    pub(crate) fn maybe_auto_activate(&self, shift: Shift) -> Option<Shift> {
        if !self.config.auto_activate
            || shift.status != ShiftStatus::PendingVerification
            || shift.verification_status != VerificationStatus::Verified
        {
            return None;
        }
        match self.activate_locked(shift) {
            Ok(shift) => Some(shift),
            Err(e) if e.kind() == crate::ErrorKind::Precondition => {
                debug!(error = %e, "Auto-activation not yet possible");
                None
            }
            Err(e) => {
                warn!(error = %e, "Auto-activation failed");
                None
            }
        }
    }

    /// Close a pending or active shift.
    ///
    /// Admins must give a reason; for drivers it is optional. Any trip in
    /// progress is cancelled first, then the vehicle and driver locks are
    /// released.
    pub async fn close_shift(
        &self,
        shift_id: &ShiftId,
        reason: Option<&str>,
        closed_by: Actor,
    ) -> Result<Shift> {
        let reason = match (&closed_by, reason) {
            (Actor::Admin(_), reason) => {
                Some(require_reason(reason.unwrap_or(""), "close a shift as admin")?)
            }
            (_, Some(reason)) if !reason.trim().is_empty() => Some(reason.trim().to_string()),
            _ => None,
        };

        let _guard = self.lock_shift(shift_id).await;
        let mut shift = self.shift(shift_id)?;
        if shift.status == ShiftStatus::Closed {
            return Err(EngineError::ShiftAlreadyClosed(shift.id));
        }
        if let Actor::Driver(driver_id) = &closed_by {
            if *driver_id != shift.driver_id {
                return Err(EngineError::Validation(format!(
                    "shift {} belongs to another driver",
                    shift.id
                )));
            }
        }

        let now = now_ms();
        let running = self.store.in_progress_trip_for_shift(&shift.id)?;
        let _trip_guard = match &running {
            Some(trip) => Some(self.lock_trip(&trip.id).await),
            None => None,
        };
        // Completion may have won the trip key while we waited
        let running = match running {
            Some(trip) => Some(self.trip(&trip.id)?).filter(|t| t.status == TripStatus::InProgress),
            None => None,
        };
        let cancelled_trip = match &running {
            Some(trip) => {
                let mut cancelled = trip.clone();
                cancelled.cancel(SHIFT_CLOSED_REASON, Actor::System, now)?;
                Some(cancelled)
            }
            None => None,
        };
        let released = match self.store.active_assignment_for_shift(&shift.id)? {
            Some(mut assignment) => {
                assignment.release(now)?;
                Some(assignment)
            }
            None => None,
        };
        let before = shift.clone();
        shift.close(reason, closed_by, now)?;

        // Writes go trip, shift, assignment; a failure puts back the ones
        // already made.
        if let Some(trip) = &cancelled_trip {
            self.store.update_trip(trip, TripStatus::InProgress)?;
        }
        if let Err(e) = self
            .store
            .update_shift(&shift, before.status, before.verification_status)
        {
            self.undo_close_cancel(running.as_ref(), cancelled_trip.as_ref());
            return Err(e.into());
        }
        if let Some(assignment) = &released {
            if let Err(e) = self.store.release_assignment(assignment) {
                self.undo(
                    "shift close",
                    shift.id.as_str(),
                    self.store
                        .update_shift(&before, shift.status, shift.verification_status),
                );
                self.undo_close_cancel(running.as_ref(), cancelled_trip.as_ref());
                return Err(e.into());
            }
            self.locks
                .release(&LockManager::vehicle_key(&assignment.vehicle_id));
        }
        self.locks.release(&LockManager::driver_key(&shift.driver_id));
        if let Some(tracking) = &self.tracking {
            tracking.forget_driver(&shift.driver_id);
        }

        if let Some(trip) = &cancelled_trip {
            warn!(
                trip_id = %trip.id,
                shift_id = %shift.id,
                "Trip in progress cancelled by shift close"
            );
        }
        info!(
            shift_id = %shift.id,
            driver_id = %shift.driver_id,
            vehicle_id = ?released.as_ref().map(|a| a.vehicle_id.to_string()),
            closed_by = ?shift.closed_by,
            "Shift closed"
        );
        if let Some(trip) = &cancelled_trip {
            self.emit_trip_cancelled(trip);
        }
        self.emit(
            EventBuilder::new(event_types::SHIFT_CLOSED, &shift.id)
                .to_driver(&shift.driver_id)
                .payload(&shift)
                .build(),
        );
        Ok(shift)
    }

    /// Put a trip cancelled by a failed close back in progress. If the
    /// store refuses, the cancellation stands and subscribers are told.
    fn undo_close_cancel(&self, running: Option<&Trip>, cancelled: Option<&Trip>) {
        let (Some(running), Some(cancelled)) = (running, cancelled) else {
            return;
        };
        let restored = self.undo(
            "trip cancellation",
            running.id.as_str(),
            self.store.update_trip(running, TripStatus::Cancelled),
        );
        if !restored {
            self.emit_trip_cancelled(cancelled);
        }
    }

    fn emit_trip_cancelled(&self, trip: &Trip) {
        self.emit(
            EventBuilder::new(event_types::TRIP_CANCELLED, &trip.id)
                .to_driver(&trip.driver_id)
                .payload(trip)
                .build(),
        );
    }
}
