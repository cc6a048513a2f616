//! FleetOps Live - real-time fan-out of fleet activity
//!
//! This crate pushes state changes to connected dispatch consoles and
//! driver apps. It handles:
//! - Domain event broadcasting with per-audience filtering
//! - Live driver positions, kept apart from domain events
//! - The WebSocket transport both ride on
//!
//! # Delivery
//!
//! Delivery is best effort. A subscriber that falls too far behind loses
//! the oldest events and receives a `lagged` notice; it should re-fetch
//! authoritative state from the engine. Publishers are never blocked.
//!
//! # Examples
//!
//! ```
//! use fleetops_core::{event_types, DriverId, EventBuilder};
//! use fleetops_live::{Broadcaster, Delivery, Role};
//!
//! let hub = Broadcaster::new(16);
//! let mut driver = hub.subscribe(Role::Driver, "d-1");
//!
//! hub.broadcast(
//!     EventBuilder::new(event_types::TRIP_ASSIGNED, "t-1")
//!         .to_driver(&DriverId::new("d-1"))
//!         .build(),
//! );
//! assert!(matches!(driver.try_recv(), Some(Delivery::Event(_))));
//! ```

pub mod broadcaster;
pub mod schema;
pub mod tracking;
pub mod websocket;

pub use broadcaster::{Broadcaster, Delivery, Role, SubscriberInfo, Subscription};
pub use schema::{ClientFrame, ServerFrame};
pub use tracking::{PositionFeed, PositionSample, TrackingError, TrackingStream};
pub use websocket::{TransportError, WsServer, DEFAULT_HANDSHAKE_TIMEOUT};
