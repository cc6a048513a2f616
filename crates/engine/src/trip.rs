//! Trip State Machine
//!
//! # State Transitions
//!
//! ```text
//! Assign ──► ASSIGNED ──Start──► IN_PROGRESS ──Complete──► COMPLETED
//!               │                    │
//!               └──────Cancel────────┴──────────────────► CANCELLED
//! ```
//!
//! A trip is bound to the driver's shift when it starts; only an Active
//! shift may start a trip and only one trip per shift may be in progress.
//! Shift key before trip key whenever both are taken.

use crate::engine::FleetEngine;
use crate::error::{EngineError, Result};
use fleetops_core::{event_types, time::now_ms, DriverId, EventBuilder, TripId};
use fleetops_domain::{Actor, DomainError, ShiftStatus, Trip, TripDetails, TripStatus};
use fleetops_store::StoreError;
use tracing::{debug, info};

impl FleetEngine {
    /// Dispatch a trip to a driver. The driver need not be on shift yet.
    pub async fn assign_trip(&self, driver_id: &DriverId, details: TripDetails) -> Result<Trip> {
        details.validate()?;
        let trip = Trip::new(driver_id.clone(), details, now_ms());
        self.store.insert_trip(&trip)?;

        info!(trip_id = %trip.id, driver_id = %driver_id, "Trip assigned");
        self.emit(
            EventBuilder::new(event_types::TRIP_ASSIGNED, &trip.id)
                .to_driver(driver_id)
                .payload(&trip)
                .build(),
        );
        Ok(trip)
    }

    /// ASSIGNED → IN_PROGRESS on the driver's active shift.
    pub async fn start_trip(&self, trip_id: &TripId) -> Result<Trip> {
        let trip = self.trip(trip_id)?;
        if !trip.status.can_transition_to(TripStatus::InProgress) {
            return Err(invalid_start(&trip));
        }
        let shift = self
            .store
            .open_shift_for_driver(&trip.driver_id)?
            .ok_or_else(|| EngineError::ShiftNotActive(trip.driver_id.clone()))?;

        let _shift_guard = self.lock_shift(&shift.id).await;
        let _trip_guard = self.lock_trip(trip_id).await;

        let shift = self.shift(&shift.id)?;
        if shift.status != ShiftStatus::Active {
            debug!(trip_id = %trip_id, shift_id = %shift.id, status = %shift.status, "Shift not active");
            return Err(EngineError::ShiftNotActive(shift.driver_id));
        }
        let mut trip = self.trip(trip_id)?;
        if trip.status != TripStatus::Assigned {
            return Err(invalid_start(&trip));
        }
        if let Some(running) = self.store.in_progress_trip_for_shift(&shift.id)? {
            return Err(EngineError::TripAlreadyInProgress {
                shift_id: shift.id,
                trip_id: running.id,
            });
        }

        trip.start(shift.id.clone(), now_ms())?;
        self.store
            .update_trip(&trip, TripStatus::Assigned)
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => EngineError::TripAlreadyInProgress {
                    shift_id: shift.id.clone(),
                    trip_id: trip.id.clone(),
                },
                other => other.into(),
            })?;

        info!(trip_id = %trip.id, shift_id = %shift.id, driver_id = %trip.driver_id, "Trip started");
        self.emit(
            EventBuilder::new(event_types::TRIP_STARTED, &trip.id)
                .to_driver(&trip.driver_id)
                .payload(&trip)
                .build(),
        );
        Ok(trip)
    }

    /// IN_PROGRESS → COMPLETED.
    pub async fn complete_trip(&self, trip_id: &TripId) -> Result<Trip> {
        let _guard = self.lock_trip(trip_id).await;
        let mut trip = self.trip(trip_id)?;
        trip.complete(now_ms())?;
        self.store.update_trip(&trip, TripStatus::InProgress)?;

        info!(trip_id = %trip.id, driver_id = %trip.driver_id, "Trip completed");
        self.emit(
            EventBuilder::new(event_types::TRIP_COMPLETED, &trip.id)
                .to_driver(&trip.driver_id)
                .payload(&trip)
                .build(),
        );
        Ok(trip)
    }

    /// ASSIGNED | IN_PROGRESS → CANCELLED. A reason is always required.
    pub async fn cancel_trip(
        &self,
        trip_id: &TripId,
        reason: &str,
        cancelled_by: Actor,
    ) -> Result<Trip> {
        fleetops_domain::require_reason(reason, "cancel a trip")?;

        let _guard = self.lock_trip(trip_id).await;
        let mut trip = self.trip(trip_id)?;
        let expected = trip.status;
        trip.cancel(reason, cancelled_by, now_ms())?;
        self.store.update_trip(&trip, expected)?;

        info!(
            trip_id = %trip.id,
            driver_id = %trip.driver_id,
            from = %expected,
            cancelled_by = ?trip.cancelled_by,
            "Trip cancelled"
        );
        self.emit(
            EventBuilder::new(event_types::TRIP_CANCELLED, &trip.id)
                .to_driver(&trip.driver_id)
                .payload(&trip)
                .build(),
        );
        Ok(trip)
    }
}

fn invalid_start(trip: &Trip) -> EngineError {
    DomainError::InvalidTransition {
        entity: "trip",
        from: trip.status.to_string(),
        to: TripStatus::InProgress.to_string(),
    }
    .into()
}
