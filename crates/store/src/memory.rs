//! In-memory [`FleetStore`].
//!
//! A single `RwLock` guards every map, so each call (including the
//! compare-and-set updates) is atomic with respect to every other call.

use crate::error::{StoreError, StoreResult};
use crate::FleetStore;
use fleetops_core::{AssignmentId, DriverId, ShiftId, TripId, VehicleId};
use fleetops_domain::{
    Shift, ShiftStatus, Trip, TripStatus, VehicleAssignment, VerificationRecord,
    VerificationStatus,
};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Tables {
    shifts: HashMap<ShiftId, Shift>,
    assignments: HashMap<AssignmentId, VehicleAssignment>,
    trips: HashMap<TripId, Trip>,
    /// Attempts per shift in insertion order
    verifications: HashMap<ShiftId, Vec<VerificationRecord>>,
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| StoreError::Poisoned)
    }
}

fn sorted_trips(mut trips: Vec<Trip>) -> Vec<Trip> {
    trips.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    trips
}

impl FleetStore for MemoryStore {
    fn insert_shift(&self, shift: &Shift) -> StoreResult<()> {
        let mut t = self.write()?;
        if t.shifts.contains_key(&shift.id) {
            return Err(StoreError::UniqueViolation(format!("shift {}", shift.id)));
        }
        if shift.is_open()
            && t.shifts
                .values()
                .any(|s| s.driver_id == shift.driver_id && s.is_open())
        {
            return Err(StoreError::UniqueViolation(format!(
                "driver {} already has an open shift",
                shift.driver_id
            )));
        }
        t.shifts.insert(shift.id.clone(), shift.clone());
        Ok(())
    }

    fn get_shift(&self, id: &ShiftId) -> StoreResult<Option<Shift>> {
        Ok(self.read()?.shifts.get(id).cloned())
    }

    fn update_shift(
        &self,
        shift: &Shift,
        expected_status: ShiftStatus,
        expected_verification: VerificationStatus,
    ) -> StoreResult<()> {
        let mut t = self.write()?;
        let stored = t.shifts.get_mut(&shift.id).ok_or_else(|| StoreError::NotFound {
            entity: "shift",
            id: shift.id.to_string(),
        })?;
        if stored.status != expected_status || stored.verification_status != expected_verification
        {
            return Err(StoreError::StaleWrite {
                entity: "shift",
                id: shift.id.to_string(),
                expected: format!("{}/{}", expected_status, expected_verification),
            });
        }
        *stored = shift.clone();
        Ok(())
    }

    fn open_shift_for_driver(&self, driver_id: &DriverId) -> StoreResult<Option<Shift>> {
        Ok(self
            .read()?
            .shifts
            .values()
            .find(|s| &s.driver_id == driver_id && s.is_open())
            .cloned())
    }

    fn open_shifts(&self) -> StoreResult<Vec<Shift>> {
        let mut shifts: Vec<Shift> = self
            .read()?
            .shifts
            .values()
            .filter(|s| s.is_open())
            .cloned()
            .collect();
        shifts.sort_by_key(|s| s.created_at);
        Ok(shifts)
    }

    fn insert_assignment(&self, assignment: &VehicleAssignment) -> StoreResult<()> {
        let mut t = self.write()?;
        if t.assignments.contains_key(&assignment.id) {
            return Err(StoreError::UniqueViolation(format!(
                "assignment {}",
                assignment.id
            )));
        }
        if assignment.active
            && t.assignments.values().any(|a| {
                a.active && (a.vehicle_id == assignment.vehicle_id || a.shift_id == assignment.shift_id)
            })
        {
            return Err(StoreError::UniqueViolation(format!(
                "vehicle {} or shift {} already has an active assignment",
                assignment.vehicle_id, assignment.shift_id
            )));
        }
        t.assignments
            .insert(assignment.id.clone(), assignment.clone());
        Ok(())
    }

    fn release_assignment(&self, assignment: &VehicleAssignment) -> StoreResult<()> {
        let mut t = self.write()?;
        let stored = t
            .assignments
            .get_mut(&assignment.id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "assignment",
                id: assignment.id.to_string(),
            })?;
        if !stored.active {
            return Err(StoreError::StaleWrite {
                entity: "assignment",
                id: assignment.id.to_string(),
                expected: "active".to_string(),
            });
        }
        *stored = assignment.clone();
        Ok(())
    }

    fn active_assignment_for_vehicle(
        &self,
        vehicle_id: &VehicleId,
    ) -> StoreResult<Option<VehicleAssignment>> {
        Ok(self
            .read()?
            .assignments
            .values()
            .find(|a| a.active && &a.vehicle_id == vehicle_id)
            .cloned())
    }

    fn active_assignment_for_shift(
        &self,
        shift_id: &ShiftId,
    ) -> StoreResult<Option<VehicleAssignment>> {
        Ok(self
            .read()?
            .assignments
            .values()
            .find(|a| a.active && &a.shift_id == shift_id)
            .cloned())
    }

    fn active_assignments(&self) -> StoreResult<Vec<VehicleAssignment>> {
        let mut active: Vec<VehicleAssignment> = self
            .read()?
            .assignments
            .values()
            .filter(|a| a.active)
            .cloned()
            .collect();
        active.sort_by_key(|a| a.assigned_at);
        Ok(active)
    }

    fn insert_trip(&self, trip: &Trip) -> StoreResult<()> {
        let mut t = self.write()?;
        if t.trips.contains_key(&trip.id) {
            return Err(StoreError::UniqueViolation(format!("trip {}", trip.id)));
        }
        t.trips.insert(trip.id.clone(), trip.clone());
        Ok(())
    }

    fn get_trip(&self, id: &TripId) -> StoreResult<Option<Trip>> {
        Ok(self.read()?.trips.get(id).cloned())
    }

    fn update_trip(&self, trip: &Trip, expected_status: TripStatus) -> StoreResult<()> {
        let mut t = self.write()?;
        if trip.status == TripStatus::InProgress {
            if let Some(shift_id) = &trip.shift_id {
                let clash = t.trips.values().any(|other| {
                    other.id != trip.id
                        && other.status == TripStatus::InProgress
                        && other.shift_id.as_ref() == Some(shift_id)
                });
                if clash {
                    return Err(StoreError::UniqueViolation(format!(
                        "shift {} already has a trip in progress",
                        shift_id
                    )));
                }
            }
        }
        let stored = t.trips.get_mut(&trip.id).ok_or_else(|| StoreError::NotFound {
            entity: "trip",
            id: trip.id.to_string(),
        })?;
        if stored.status != expected_status {
            return Err(StoreError::StaleWrite {
                entity: "trip",
                id: trip.id.to_string(),
                expected: expected_status.to_string(),
            });
        }
        *stored = trip.clone();
        Ok(())
    }

    fn trips_for_shift(&self, shift_id: &ShiftId) -> StoreResult<Vec<Trip>> {
        Ok(sorted_trips(
            self.read()?
                .trips
                .values()
                .filter(|t| t.shift_id.as_ref() == Some(shift_id))
                .cloned()
                .collect(),
        ))
    }

    fn trips_for_driver(&self, driver_id: &DriverId) -> StoreResult<Vec<Trip>> {
        Ok(sorted_trips(
            self.read()?
                .trips
                .values()
                .filter(|t| &t.driver_id == driver_id)
                .cloned()
                .collect(),
        ))
    }

    fn in_progress_trip_for_shift(&self, shift_id: &ShiftId) -> StoreResult<Option<Trip>> {
        Ok(self
            .read()?
            .trips
            .values()
            .find(|t| t.status == TripStatus::InProgress && t.shift_id.as_ref() == Some(shift_id))
            .cloned())
    }

    fn insert_verification(&self, record: &VerificationRecord) -> StoreResult<()> {
        let mut t = self.write()?;
        let attempts = t.verifications.entry(record.shift_id.clone()).or_default();
        if attempts.iter().any(|r| r.id == record.id) {
            return Err(StoreError::UniqueViolation(format!(
                "verification {}",
                record.id
            )));
        }
        attempts.push(record.clone());
        Ok(())
    }

    fn update_verification(
        &self,
        record: &VerificationRecord,
        expected_status: VerificationStatus,
    ) -> StoreResult<()> {
        let mut t = self.write()?;
        let stored = t
            .verifications
            .get_mut(&record.shift_id)
            .and_then(|attempts| attempts.iter_mut().find(|r| r.id == record.id))
            .ok_or_else(|| StoreError::NotFound {
                entity: "verification",
                id: record.id.to_string(),
            })?;
        if stored.status != expected_status {
            return Err(StoreError::StaleWrite {
                entity: "verification",
                id: record.id.to_string(),
                expected: expected_status.to_string(),
            });
        }
        *stored = record.clone();
        Ok(())
    }

    fn latest_verification(&self, shift_id: &ShiftId) -> StoreResult<Option<VerificationRecord>> {
        Ok(self
            .read()?
            .verifications
            .get(shift_id)
            .and_then(|attempts| attempts.last().cloned()))
    }

    fn verifications_for_shift(&self, shift_id: &ShiftId) -> StoreResult<Vec<VerificationRecord>> {
        Ok(self
            .read()?
            .verifications
            .get(shift_id)
            .cloned()
            .unwrap_or_default())
    }
}
