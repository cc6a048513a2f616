//! Live Tracking Stream
//!
//! High-frequency position samples from on-duty drivers, kept apart from
//! the low-frequency domain events so a burst of GPS fixes can never push
//! a shift or trip transition out of a subscriber's ring.
//!
//! Only the latest sample per driver is held; history belongs to whatever
//! consumes the `driver_position` feed.

use crate::broadcaster::Role;
use fleetops_core::{DriverId, ShiftId, TripId};
use fleetops_domain::{ShiftStatus, TripStatus};
use fleetops_store::{FleetStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

/// One GPS fix from a driver device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    pub driver_id: DriverId,
    pub shift_id: ShiftId,
    pub trip_id: Option<TripId>,
    pub lat: f64,
    pub lng: f64,
    /// Degrees clockwise from north
    pub heading: Option<f64>,
    /// Metres per second
    pub speed: Option<f64>,
    /// Horizontal accuracy in metres
    pub accuracy: Option<f64>,
    /// Fix time (Unix epoch milliseconds)
    pub timestamp: u64,
}

/// Why a sample was refused.
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("Invalid position: {0}")]
    InvalidSample(String),

    #[error("Unknown shift: {0}")]
    UnknownShift(String),

    #[error("Shift {shift_id} does not belong to driver {driver_id}")]
    ShiftMismatch { shift_id: String, driver_id: String },

    #[error("Shift {shift_id} is {status}, positions are only accepted from active shifts")]
    ShiftNotActive { shift_id: String, status: ShiftStatus },

    #[error("Trip {0} is not in progress on this shift")]
    TripNotInProgress(String),

    #[error("Position feed is restricted to admins")]
    NotAuthorized,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl TrackingError {
    /// Stable code for wire error frames.
    pub fn code(&self) -> &'static str {
        match self {
            TrackingError::InvalidSample(_) => "INVALID_POSITION",
            TrackingError::UnknownShift(_) => "NOT_FOUND",
            TrackingError::ShiftMismatch { .. } => "SHIFT_MISMATCH",
            TrackingError::ShiftNotActive { .. } => "SHIFT_NOT_ACTIVE",
            TrackingError::TripNotInProgress(_) => "TRIP_NOT_IN_PROGRESS",
            TrackingError::NotAuthorized => "NOT_AUTHORIZED",
            TrackingError::Store(_) => "STORE_FAILURE",
        }
    }
}

impl PositionSample {
    fn validate(&self) -> Result<(), TrackingError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(TrackingError::InvalidSample(format!("latitude {}", self.lat)));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(TrackingError::InvalidSample(format!("longitude {}", self.lng)));
        }
        if let Some(accuracy) = self.accuracy {
            if !accuracy.is_finite() || accuracy < 0.0 {
                return Err(TrackingError::InvalidSample(format!("accuracy {}", accuracy)));
            }
        }
        if let Some(speed) = self.speed {
            if !speed.is_finite() || speed < 0.0 {
                return Err(TrackingError::InvalidSample(format!("speed {}", speed)));
            }
        }
        Ok(())
    }
}

/// Latest-position registry plus admin fan-out.
pub struct TrackingStream {
    store: Arc<dyn FleetStore>,
    tx: broadcast::Sender<Arc<PositionSample>>,
    latest: RwLock<HashMap<DriverId, PositionSample>>,
}

impl TrackingStream {
    /// Default ring capacity
    pub const DEFAULT_CAPACITY: usize = 4096;

    pub fn new(store: Arc<dyn FleetStore>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            store,
            tx,
            latest: RwLock::new(HashMap::new()),
        }
    }

    /// Accept a sample from an Active shift.
    ///
    /// Returns `true` when the sample became the driver's latest and was
    /// republished, `false` when an equal-or-newer sample was already held.
    ///
    /// The shift check, the insert and the republish all happen under the
    /// registry lock, so a [`forget_driver`](Self::forget_driver) issued after
    /// the shift closed always runs after them.
    pub fn ingest(&self, sample: PositionSample) -> Result<bool, TrackingError> {
        sample.validate()?;

        let mut latest = self.latest.write().unwrap_or_else(|p| p.into_inner());
        self.check_on_duty(&sample)?;

        if let Some(held) = latest.get(&sample.driver_id) {
            if held.shift_id == sample.shift_id && held.timestamp >= sample.timestamp {
                return Ok(false);
            }
        }
        latest.insert(sample.driver_id.clone(), sample.clone());
        let _ = self.tx.send(Arc::new(sample));
        Ok(true)
    }

    fn check_on_duty(&self, sample: &PositionSample) -> Result<(), TrackingError> {
        let shift = self
            .store
            .get_shift(&sample.shift_id)?
            .ok_or_else(|| TrackingError::UnknownShift(sample.shift_id.to_string()))?;
        if shift.driver_id != sample.driver_id {
            return Err(TrackingError::ShiftMismatch {
                shift_id: shift.id.to_string(),
                driver_id: sample.driver_id.to_string(),
            });
        }
        if shift.status != ShiftStatus::Active {
            debug!(
                shift_id = %shift.id,
                status = %shift.status,
                "Position rejected from non-active shift"
            );
            return Err(TrackingError::ShiftNotActive {
                shift_id: shift.id.to_string(),
                status: shift.status,
            });
        }
        if let Some(trip_id) = &sample.trip_id {
            let on_trip = self
                .store
                .get_trip(trip_id)?
                .map(|t| {
                    t.status == TripStatus::InProgress && t.shift_id.as_ref() == Some(&shift.id)
                })
                .unwrap_or(false);
            if !on_trip {
                return Err(TrackingError::TripNotInProgress(trip_id.to_string()));
            }
        }
        Ok(())
    }

    /// Open an admin position feed.
    pub fn subscribe(&self, role: Role) -> Result<PositionFeed, TrackingError> {
        if role != Role::Admin {
            return Err(TrackingError::NotAuthorized);
        }
        Ok(PositionFeed {
            rx: self.tx.subscribe(),
        })
    }

    /// Latest sample of every tracked driver.
    pub fn latest_positions(&self) -> Vec<PositionSample> {
        let latest = self.latest.read().unwrap_or_else(|p| p.into_inner());
        let mut positions: Vec<PositionSample> = latest.values().cloned().collect();
        positions.sort_by(|a, b| a.driver_id.cmp(&b.driver_id));
        positions
    }

    /// Latest sample of one driver.
    pub fn latest_for(&self, driver_id: &DriverId) -> Option<PositionSample> {
        let latest = self.latest.read().unwrap_or_else(|p| p.into_inner());
        latest.get(driver_id).cloned()
    }

    /// Drop a driver's sample, e.g. when their shift closes.
    pub fn forget_driver(&self, driver_id: &DriverId) {
        let mut latest = self.latest.write().unwrap_or_else(|p| p.into_inner());
        latest.remove(driver_id);
    }

    /// Remove samples older than `max_age_ms` relative to `now_ms`.
    pub fn prune_stale(&self, max_age_ms: u64, now_ms: u64) -> usize {
        let mut latest = self.latest.write().unwrap_or_else(|p| p.into_inner());
        let before = latest.len();
        latest.retain(|_, s| now_ms.saturating_sub(s.timestamp) <= max_age_ms);
        let pruned = before - latest.len();
        if pruned > 0 {
            debug!(pruned, "Pruned stale positions");
        }
        pruned
    }
}

/// Admin receiver of `driver_position` samples.
pub struct PositionFeed {
    rx: broadcast::Receiver<Arc<PositionSample>>,
}

impl PositionFeed {
    /// Next sample; lagging silently skips to the oldest retained sample.
    pub async fn recv(&mut self) -> Option<Arc<PositionSample>> {
        loop {
            match self.rx.recv().await {
                Ok(sample) => return Some(sample),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Position feed lagging, samples dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next sample if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<PositionSample>> {
        loop {
            match self.rx.try_recv() {
                Ok(sample) => return Some(sample),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
