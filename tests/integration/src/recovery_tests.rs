//! Locks survive a process restart through the SQLite store.

use crate::test_utils::TestFleet;
use fleetops_core::{DriverId, EngineConfig, VehicleId};
use fleetops_domain::{Actor, ShiftStatus};
use fleetops_store::{FleetStore, SqliteStore};
use std::path::PathBuf;
use std::sync::Arc;

fn temp_db() -> (PathBuf, PathBuf) {
    let dir = std::env::temp_dir().join(format!("fleetops-it-{}", uuid::Uuid::new_v4()));
    let db = dir.join("fleet.db");
    (dir, db)
}

fn open_fleet(db: &PathBuf) -> TestFleet {
    let store: Arc<dyn FleetStore> = Arc::new(SqliteStore::open(db).expect("open sqlite"));
    let fleet = TestFleet::with_store(store, EngineConfig::default());
    fleet.engine.recover_locks().expect("recover locks");
    fleet
}

#[tokio::test]
async fn test_locks_recovered_after_restart() {
    let (dir, db) = temp_db();

    let shift_id = {
        let fleet = open_fleet(&db);
        let shift = fleet.active_shift("driver-a", "vehicle-1").await;
        shift.id
    };

    // New process: nothing in memory, everything in the database
    let fleet = open_fleet(&db);
    assert!(fleet.engine.locks().is_held("driver:driver-a"));
    assert!(fleet.engine.locks().is_held("vehicle:vehicle-1"));

    let err = fleet
        .engine
        .start_shift(&DriverId::new("driver-a"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "DRIVER_HAS_ACTIVE_SHIFT");

    let other = fleet
        .engine
        .start_shift(&DriverId::new("driver-b"))
        .await
        .unwrap();
    let err = fleet
        .engine
        .attach_vehicle(&other.id, &VehicleId::new("vehicle-1"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VEHICLE_ALREADY_ASSIGNED");

    // Closing in the new process frees both keys
    let closed = fleet
        .engine
        .close_shift(&shift_id, None, Actor::Driver(DriverId::new("driver-a")))
        .await
        .unwrap();
    assert_eq!(closed.status, ShiftStatus::Closed);
    fleet
        .engine
        .attach_vehicle(&other.id, &VehicleId::new("vehicle-1"))
        .await
        .unwrap();

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_store_index_backs_up_lock_table() {
    // A second engine over the same database without recovery: its lock
    // table is empty, but the store's uniqueness rules still refuse a
    // duplicate open shift.
    let (dir, db) = temp_db();
    let first = open_fleet(&db);
    first
        .engine
        .start_shift(&DriverId::new("driver-z"))
        .await
        .unwrap();

    let store: Arc<dyn FleetStore> = Arc::new(SqliteStore::open(&db).expect("open sqlite"));
    let second = TestFleet::with_store(store, EngineConfig::default());
    let err = second
        .engine
        .start_shift(&DriverId::new("driver-z"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "DRIVER_HAS_ACTIVE_SHIFT");
    assert!(!second.engine.locks().is_held("driver:driver-z"));

    let _ = std::fs::remove_dir_all(&dir);
}
