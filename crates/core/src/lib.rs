//! Core functionality for the FleetOps state engine.
//!
//! This crate provides the fundamental types, traits, and utilities used
//! across the FleetOps workspace: identifiers, the clock, configuration,
//! logging initialization and the domain-event envelope every accepted
//! state transition is published as.

pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod time;
pub mod types;

pub use config::{
    BroadcastConfig, Config, EnrolledDriver, EngineConfig, LoggingConfig, ServerConfig,
    StorageConfig, VerificationConfig, DEVICE_TRUST_LEVELS,
};
pub use error::{CoreError, Result};
pub use event::{event_types, Audience, DomainEvent, EventBuilder, EventSink, MemorySink, NullSink};
pub use types::{
    AdminId, AssignmentId, ConnectionId, DriverId, ShiftId, TripId, VehicleId, VerificationId,
};
