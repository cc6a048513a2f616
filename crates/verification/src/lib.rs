//! Identity verification policy for shift start.
//!
//! This crate owns everything the Verification Gate needs that is not
//! shift state:
//! - [`FaceMatcher`]: the external similarity classifier (black box, 0–100)
//! - [`DriverProfiles`]: reference photos and device trust per driver
//! - [`VerificationPolicy`]: thresholds turning a score and a device trust
//!   level into a [`fleetops_domain::VerificationOutcome`]
//!
//! # Decision Policy
//!
//! - device `Revoked` → auto reject, matcher not consulted
//! - score ≥ high threshold → auto match (manual review if the device is
//!   only `Unrecognized`)
//! - score < low threshold → auto reject, driver may retry
//! - anything in between, or a matcher failure → manual review

#![warn(missing_docs)]

pub mod matcher;
pub mod policy;
pub mod profiles;

pub use matcher::{FaceMatcher, FixedScoreMatcher, MatcherError, PhotoRef};
pub use policy::{ScoreBand, VerificationPolicy};
pub use profiles::{DeviceTrust, DriverProfile, DriverProfiles, InMemoryProfiles, ProfileError};
