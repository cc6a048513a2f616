//! Integration tests for the FleetOps state engine
//!
//! This test suite validates:
//! - The driver shift scenario end to end (verification retry, vehicle
//!   check-in, activation, duplicate clock-in)
//! - Admin close of a shift with a trip in progress
//! - Exclusivity under concurrent clock-ins and vehicle check-ins
//! - Live delivery of domain events and positions over WebSocket
//! - Lock recovery from a SQLite store after restart
//! - Rollback of multi-record transitions when a store write fails

pub mod test_utils;

#[cfg(test)]
mod shift_lifecycle_tests;

#[cfg(test)]
mod concurrency_tests;

#[cfg(test)]
mod live_feed_tests;

#[cfg(test)]
mod recovery_tests;

#[cfg(test)]
mod store_failure_tests;
