//! Vehicle check-in records.

use crate::error::{DomainError, Result};
use fleetops_core::{AssignmentId, DriverId, ShiftId, VehicleId};
use serde::{Deserialize, Serialize};

/// Links one vehicle to one shift while `active`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleAssignment {
    pub id: AssignmentId,
    pub vehicle_id: VehicleId,
    pub shift_id: ShiftId,
    pub driver_id: DriverId,
    pub active: bool,
    pub assigned_at: u64,
    pub released_at: Option<u64>,
}

impl VehicleAssignment {
    pub fn new(vehicle_id: VehicleId, shift_id: ShiftId, driver_id: DriverId, now: u64) -> Self {
        Self {
            id: AssignmentId::generate(),
            vehicle_id,
            shift_id,
            driver_id,
            active: true,
            assigned_at: now,
            released_at: None,
        }
    }

    /// Deactivate once; a released assignment never comes back.
    pub fn release(&mut self, now: u64) -> Result<()> {
        if !self.active {
            return Err(DomainError::InvalidTransition {
                entity: "assignment",
                from: "inactive".to_string(),
                to: "inactive".to_string(),
            });
        }
        self.active = false;
        self.released_at = Some(now);
        Ok(())
    }
}
