//! Domain event envelope for accepted state transitions.
//!
//! Every transition the state machines accept produces exactly one
//! [`DomainEvent`]. Events are immutable notifications routed by
//! [`Audience`]; they are not a log and carry no delivery guarantee beyond
//! best effort.

use crate::types::DriverId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

/// Who an event is addressed to.
///
/// Serialized as `driver:<id>` or `role:admin`. Admins observe every event
/// regardless of audience; drivers observe only events addressed to them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Audience {
    /// A single driver
    Driver(DriverId),
    /// All admin consoles
    Admins,
}

impl Audience {
    /// Driver this audience targets, if any.
    pub fn driver(&self) -> Option<&DriverId> {
        match self {
            Audience::Driver(id) => Some(id),
            Audience::Admins => None,
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Audience::Driver(id) => write!(f, "driver:{}", id),
            Audience::Admins => f.write_str("role:admin"),
        }
    }
}

impl From<Audience> for String {
    fn from(audience: Audience) -> Self {
        audience.to_string()
    }
}

impl TryFrom<String> for Audience {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "role:admin" {
            return Ok(Audience::Admins);
        }
        match value.strip_prefix("driver:") {
            Some(id) if !id.is_empty() => Ok(Audience::Driver(DriverId::new(id))),
            _ => Err(format!("unknown audience '{}'", value)),
        }
    }
}

/// Immutable record of an accepted state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    /// Event type, e.g. `shift.started`
    #[serde(rename = "type")]
    pub event_type: String,
    /// Shift, trip or verification id the event is about
    pub entity_id: String,
    /// Routing target
    pub audience: Audience,
    /// Event-specific body
    pub payload: serde_json::Value,
    /// Emission time (Unix epoch milliseconds)
    pub emitted_at: u64,
    /// Broadcaster-assigned sequence number; zero until published
    #[serde(default)]
    pub seq: u64,
}

/// Builder for creating events.
pub struct EventBuilder {
    event: DomainEvent,
}

impl EventBuilder {
    /// Start an event of `event_type` about `entity_id`, addressed to admins
    /// until [`EventBuilder::audience`] says otherwise.
    pub fn new(event_type: impl Into<String>, entity_id: impl fmt::Display) -> Self {
        Self {
            event: DomainEvent {
                event_type: event_type.into(),
                entity_id: entity_id.to_string(),
                audience: Audience::Admins,
                payload: serde_json::Value::Null,
                emitted_at: crate::time::now_ms(),
                seq: 0,
            },
        }
    }

    /// Set the audience.
    pub fn audience(mut self, audience: Audience) -> Self {
        self.event.audience = audience;
        self
    }

    /// Address the event to a single driver.
    pub fn to_driver(self, driver_id: &DriverId) -> Self {
        self.audience(Audience::Driver(driver_id.clone()))
    }

    /// Set the payload from any serializable value.
    ///
    /// A value that fails to serialize leaves the payload as `null`.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Self {
        self.event.payload = serde_json::to_value(payload).unwrap_or(serde_json::Value::Null);
        self
    }

    /// Build the event.
    pub fn build(self) -> DomainEvent {
        self.event
    }
}

/// Destination for domain events.
///
/// Publishing never fails from the caller's point of view: a notification
/// problem must not roll back a transition that already happened.
pub trait EventSink: Send + Sync {
    /// Hand an event to the sink.
    fn publish(&self, event: DomainEvent);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: DomainEvent) {}
}

/// Sink that keeps every event in memory, in publish order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DomainEvent>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far.
    pub fn events(&self) -> Vec<DomainEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Event types in publish order.
    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.event_type).collect()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: DomainEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Standard event types for state transitions.
pub mod event_types {
    // Shift events
    pub const SHIFT_STARTED: &str = "shift.started";
    pub const SHIFT_ACTIVATED: &str = "shift.activated";
    pub const SHIFT_CLOSED: &str = "shift.closed";
    pub const VEHICLE_ASSIGNED: &str = "vehicle.assigned";

    // Verification events
    pub const VERIFICATION_RESOLVED: &str = "verification.resolved";
    pub const VERIFICATION_REVIEW_REQUESTED: &str = "verification.review_requested";

    // Trip events
    pub const TRIP_ASSIGNED: &str = "trip.assigned";
    pub const TRIP_STARTED: &str = "trip.started";
    pub const TRIP_COMPLETED: &str = "trip.completed";
    pub const TRIP_CANCELLED: &str = "trip.cancelled";

    // Tracking
    pub const DRIVER_POSITION: &str = "driver_position";
}
