//! Driver reference photos and device trust.

use fleetops_core::{DriverId, VerificationConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::RwLock;
use thiserror::Error;

/// Trust in the device the driver is clocking in from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceTrust {
    /// Registered, attested device
    Trusted,
    /// Device never seen for this driver
    Unrecognized,
    /// Device explicitly revoked by an admin
    Revoked,
}

impl FromStr for DeviceTrust {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trusted" => Ok(DeviceTrust::Trusted),
            "unrecognized" => Ok(DeviceTrust::Unrecognized),
            "revoked" => Ok(DeviceTrust::Revoked),
            other => Err(ProfileError::InvalidEnrollment(format!(
                "unknown device trust '{}'",
                other
            ))),
        }
    }
}

/// What the gate needs to know about a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverProfile {
    /// Enrolled reference photo, if any
    pub reference_photo: Option<String>,
    /// Trust of the driver's current device
    pub device_trust: DeviceTrust,
}

/// Profile lookup failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProfileError {
    /// No profile for this driver
    #[error("Unknown driver: {0}")]
    UnknownDriver(String),

    /// Backend failure
    #[error("Profile backend error: {0}")]
    Backend(String),

    /// Enrollment data that cannot be turned into a profile
    #[error("Invalid enrollment: {0}")]
    InvalidEnrollment(String),
}

/// Source of driver profiles (user directory, HR system, ...).
pub trait DriverProfiles: Send + Sync {
    /// Look up a driver's profile.
    fn profile(&self, driver_id: &DriverId) -> Result<DriverProfile, ProfileError>;
}

/// Profiles held in memory.
#[derive(Debug, Default)]
pub struct InMemoryProfiles {
    profiles: RwLock<HashMap<DriverId, DriverProfile>>,
}

impl InMemoryProfiles {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory holding the drivers of `[[verification.drivers]]`.
    pub fn from_config(config: &VerificationConfig) -> Result<Self, ProfileError> {
        let profiles = Self::new();
        for driver in &config.drivers {
            let device_trust: DeviceTrust = driver.device_trust.parse()?;
            profiles.enroll(
                DriverId::new(driver.driver_id.clone()),
                driver.reference_photo.clone(),
                device_trust,
            );
        }
        Ok(profiles)
    }

    /// Number of enrolled drivers.
    pub fn len(&self) -> usize {
        self.profiles.read().map(|p| p.len()).unwrap_or(0)
    }

    /// True when nobody is enrolled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enroll or replace a driver.
    pub fn enroll(
        &self,
        driver_id: DriverId,
        reference_photo: impl Into<String>,
        device_trust: DeviceTrust,
    ) {
        if let Ok(mut profiles) = self.profiles.write() {
            profiles.insert(
                driver_id,
                DriverProfile {
                    reference_photo: Some(reference_photo.into()),
                    device_trust,
                },
            );
        }
    }

    /// Change a driver's device trust.
    pub fn set_device_trust(&self, driver_id: &DriverId, device_trust: DeviceTrust) {
        if let Ok(mut profiles) = self.profiles.write() {
            if let Some(profile) = profiles.get_mut(driver_id) {
                profile.device_trust = device_trust;
            }
        }
    }
}

impl DriverProfiles for InMemoryProfiles {
    fn profile(&self, driver_id: &DriverId) -> Result<DriverProfile, ProfileError> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| ProfileError::Backend("profile table poisoned".to_string()))?;
        profiles
            .get(driver_id)
            .cloned()
            .ok_or_else(|| ProfileError::UnknownDriver(driver_id.to_string()))
    }
}
