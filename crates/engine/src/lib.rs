//! FleetOps Engine - concurrent coordination of shifts, vehicles and trips
//!
//! This crate owns the state-coordination core:
//! - Resource Lock Manager (one open shift per driver, one active
//!   assignment per vehicle)
//! - Verification Gate arbitrating entry into `Active`
//! - Shift and Trip State Machines
//!
//! Transitions on the same shift run one at a time; transitions on
//! unrelated shifts and vehicles proceed in parallel. Every accepted
//! transition is written through the store with a compare-and-set and then
//! published as exactly one domain event.
//!
//! # Examples
//!
//! ```
//! use fleetops_core::DriverId;
//! use fleetops_engine::FleetEngine;
//! use fleetops_store::MemoryStore;
//! use fleetops_verification::{FixedScoreMatcher, InMemoryProfiles};
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let engine = FleetEngine::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(FixedScoreMatcher::with_default(90.0)),
//!     Arc::new(InMemoryProfiles::new()),
//! );
//! let shift = engine.start_shift(&DriverId::new("d-1")).await.unwrap();
//! assert!(engine.start_shift(&DriverId::new("d-1")).await.is_err());
//! # let _ = shift;
//! # });
//! ```

pub mod engine;
pub mod error;
pub mod gate;
pub mod locks;
pub mod serializer;
pub mod shift;
pub mod trip;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::FleetEngine;
pub use error::{EngineError, ErrorKind, Result};
pub use locks::{LockManager, LockToken};
pub use serializer::{KeyGuard, KeyedSerializer};
pub use shift::SHIFT_CLOSED_REASON;
