//! Exclusivity under concurrent requests.

use crate::test_utils::TestFleet;
use fleetops_core::{DriverId, VehicleId};
use fleetops_domain::{Actor, ShiftStatus};
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_attach_same_vehicle() {
    let fleet = TestFleet::new();
    let mut shifts = Vec::new();
    for i in 0..8 {
        shifts.push(
            fleet
                .engine
                .start_shift(&DriverId::new(format!("driver-{}", i)))
                .await
                .unwrap(),
        );
    }

    let tasks: Vec<_> = shifts
        .into_iter()
        .map(|shift| {
            let engine = Arc::clone(&fleet.engine);
            tokio::spawn(async move {
                engine
                    .attach_vehicle(&shift.id, &VehicleId::new("vehicle-v"))
                    .await
            })
        })
        .collect();

    let mut winners = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => assert_eq!(e.code(), "VEHICLE_ALREADY_ASSIGNED"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(fleet.active_assignment_count(&VehicleId::new("vehicle-v")), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clock_in_same_driver() {
    let fleet = TestFleet::new();
    let driver = DriverId::new("driver-x");

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let engine = Arc::clone(&fleet.engine);
            let driver = driver.clone();
            tokio::spawn(async move { engine.start_shift(&driver).await })
        })
        .collect();

    let mut winners = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => assert_eq!(e.code(), "DRIVER_HAS_ACTIVE_SHIFT"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(fleet.open_shift_count(&driver), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_activation_races_never_skip_preconditions() {
    // Activate, submit and attach race on many shifts; every shift that
    // ends up Active must be verified and hold a vehicle.
    let fleet = TestFleet::new();
    let mut handles = Vec::new();

    for i in 0..12 {
        let driver = fleet.enroll(&format!("driver-{}", i));
        let shift = fleet.engine.start_shift(&driver).await.unwrap();
        let selfie = format!("selfie-{}.jpg", i);
        fleet.score(&selfie, if i % 3 == 0 { 50.0 } else { 95.0 });

        let engine = Arc::clone(&fleet.engine);
        let id = shift.id.clone();
        handles.push(tokio::spawn(async move {
            let _ = engine.submit_verification(&id, &selfie).await;
        }));
        let engine = Arc::clone(&fleet.engine);
        let id = shift.id.clone();
        handles.push(tokio::spawn(async move {
            let _ = engine
                .attach_vehicle(&id, &VehicleId::new(format!("vehicle-{}", i % 4)))
                .await;
        }));
        for _ in 0..3 {
            let engine = Arc::clone(&fleet.engine);
            let id = shift.id.clone();
            handles.push(tokio::spawn(async move {
                tokio::task::yield_now().await;
                let _ = engine.activate(&id).await;
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for shift in fleet.store.open_shifts().unwrap() {
        if shift.status == ShiftStatus::Active {
            assert_eq!(
                shift.verification_status,
                fleetops_domain::VerificationStatus::Verified
            );
            assert!(fleet.engine.active_assignment(&shift.id).unwrap().is_some());
        }
    }
    for i in 0..4 {
        assert!(fleet.active_assignment_count(&VehicleId::new(format!("vehicle-{}", i))) <= 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_racing_trip_completion() {
    let fleet = TestFleet::new();
    for round in 0..10 {
        let shift = fleet
            .active_shift(&format!("driver-{}", round), &format!("vehicle-{}", round))
            .await;
        let trip = fleet
            .engine
            .assign_trip(&shift.driver_id, crate::test_utils::airport_run())
            .await
            .unwrap();
        fleet.engine.start_trip(&trip.id).await.unwrap();

        let engine = Arc::clone(&fleet.engine);
        let trip_id = trip.id.clone();
        let complete = tokio::spawn(async move { engine.complete_trip(&trip_id).await });
        let engine = Arc::clone(&fleet.engine);
        let shift_id = shift.id.clone();
        let driver = shift.driver_id.clone();
        let close =
            tokio::spawn(async move { engine.close_shift(&shift_id, None, Actor::Driver(driver)).await });

        let _ = complete.await.unwrap();
        close.await.unwrap().unwrap();

        let trip = fleet.engine.trip(&trip.id).unwrap();
        assert!(trip.status.is_terminal());
    }
}
