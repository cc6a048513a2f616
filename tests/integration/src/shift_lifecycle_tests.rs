//! Shift and trip lifecycle scenarios across engine, store and broadcaster.

use crate::test_utils::{airport_run, TestFleet};
use fleetops_core::{event_types, AdminId, DriverId, VehicleId};
use fleetops_domain::{Actor, AdminDecision, ShiftStatus, TripStatus, VerificationStatus};
use fleetops_live::{Delivery, Role};

#[tokio::test]
async fn test_driver_shift_scenario() {
    let fleet = TestFleet::new();
    let driver = fleet.enroll("driver-d");
    let mut driver_feed = fleet.broadcaster.subscribe(Role::Driver, driver.as_str());

    // Clock in
    let shift = fleet.engine.start_shift(&driver).await.unwrap();
    assert_eq!(shift.status, ShiftStatus::PendingVerification);

    // Low score is auto-rejected, the retry is auto-verified
    fleet.score("selfie-low.jpg", 40.0);
    fleet.score("selfie-high.jpg", 97.0);
    let rejected = fleet
        .engine
        .submit_verification(&shift.id, "selfie-low.jpg")
        .await
        .unwrap();
    assert_eq!(rejected.status, VerificationStatus::Rejected);
    let verified = fleet
        .engine
        .submit_verification(&shift.id, "selfie-high.jpg")
        .await
        .unwrap();
    assert_eq!(verified.status, VerificationStatus::Verified);

    // Vehicle check-in, then activation
    fleet
        .engine
        .attach_vehicle(&shift.id, &VehicleId::new("vehicle-v"))
        .await
        .unwrap();
    let active = fleet.engine.activate(&shift.id).await.unwrap();
    assert_eq!(active.status, ShiftStatus::Active);

    // A second clock-in is refused
    let err = fleet.engine.start_shift(&driver).await.unwrap_err();
    assert_eq!(err.code(), "DRIVER_HAS_ACTIVE_SHIFT");

    let types: Vec<String> = driver_feed
        .drain()
        .into_iter()
        .filter_map(|d| match d {
            Delivery::Event(e) => Some(e.event_type.clone()),
            Delivery::Lagged(_) => None,
        })
        .collect();
    assert_eq!(
        types,
        vec![
            event_types::SHIFT_STARTED,
            event_types::VERIFICATION_RESOLVED,
            event_types::VERIFICATION_RESOLVED,
            event_types::VEHICLE_ASSIGNED,
            event_types::SHIFT_ACTIVATED,
        ]
    );
}

#[tokio::test]
async fn test_admin_close_cancels_trip_in_progress() {
    let fleet = TestFleet::new();
    let shift = fleet.active_shift("driver-a", "vehicle-1").await;
    let trip = fleet
        .engine
        .assign_trip(&shift.driver_id, airport_run())
        .await
        .unwrap();
    fleet.engine.start_trip(&trip.id).await.unwrap();

    let mut admin_feed = fleet.broadcaster.subscribe(Role::Admin, "admin-1");
    let closed = fleet
        .engine
        .close_shift(
            &shift.id,
            Some("vehicle recalled"),
            Actor::Admin(AdminId::new("admin-1")),
        )
        .await
        .unwrap();
    assert_eq!(closed.status, ShiftStatus::Closed);

    let trip = fleet.engine.trip(&trip.id).unwrap();
    assert_eq!(trip.status, TripStatus::Cancelled);
    assert_eq!(trip.cancel_reason.as_deref(), Some("shift closed"));
    assert!(fleet
        .engine
        .trips_for_shift(&shift.id)
        .unwrap()
        .iter()
        .all(|t| t.status != TripStatus::InProgress));

    let seen: Vec<(String, u64)> = admin_feed
        .drain()
        .into_iter()
        .filter_map(|d| match d {
            Delivery::Event(e) => Some((e.event_type.clone(), e.seq)),
            Delivery::Lagged(_) => None,
        })
        .collect();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, event_types::TRIP_CANCELLED);
    assert_eq!(seen[1].0, event_types::SHIFT_CLOSED);
    assert!(seen[0].1 < seen[1].1);
}

#[tokio::test]
async fn test_close_frees_driver_and_vehicle() {
    let fleet = TestFleet::new();
    let shift = fleet.active_shift("driver-a", "vehicle-1").await;
    fleet
        .engine
        .close_shift(&shift.id, None, Actor::Driver(shift.driver_id.clone()))
        .await
        .unwrap();

    let again = fleet.engine.start_shift(&shift.driver_id).await.unwrap();
    fleet
        .engine
        .attach_vehicle(&again.id, &VehicleId::new("vehicle-1"))
        .await
        .unwrap();
    assert_eq!(fleet.open_shift_count(&shift.driver_id), 1);
    assert_eq!(fleet.active_assignment_count(&VehicleId::new("vehicle-1")), 1);
}

#[tokio::test]
async fn test_trip_waits_for_activation() {
    let fleet = TestFleet::new();
    let driver = fleet.enroll("driver-b");
    let trip = fleet.engine.assign_trip(&driver, airport_run()).await.unwrap();

    let shift = fleet.engine.start_shift(&driver).await.unwrap();
    let err = fleet.engine.start_trip(&trip.id).await.unwrap_err();
    assert_eq!(err.code(), "SHIFT_NOT_ACTIVE");

    fleet.score("selfie.jpg", 90.0);
    fleet
        .engine
        .submit_verification(&shift.id, "selfie.jpg")
        .await
        .unwrap();
    fleet
        .engine
        .attach_vehicle(&shift.id, &VehicleId::new("vehicle-2"))
        .await
        .unwrap();
    fleet.engine.activate(&shift.id).await.unwrap();

    let started = fleet.engine.start_trip(&trip.id).await.unwrap();
    assert_eq!(started.status, TripStatus::InProgress);
    assert_eq!(started.shift_id.as_ref(), Some(&shift.id));
}

#[tokio::test]
async fn test_manual_review_round_trip() {
    let fleet = TestFleet::new();
    let driver = fleet.enroll("driver-c");
    let shift = fleet.engine.start_shift(&driver).await.unwrap();
    let mut admin_feed = fleet.broadcaster.subscribe(Role::Admin, "admin-1");

    fleet.score("ambiguous.jpg", 70.0);
    fleet
        .engine
        .submit_verification(&shift.id, "ambiguous.jpg")
        .await
        .unwrap();
    match admin_feed.try_recv() {
        Some(Delivery::Event(e)) => {
            assert_eq!(e.event_type, event_types::VERIFICATION_REVIEW_REQUESTED);
            assert_eq!(e.audience.to_string(), "role:admin");
        }
        other => panic!("unexpected delivery {:?}", other),
    }

    let reviewer = AdminId::new("admin-1");
    let record = fleet
        .engine
        .admin_decide(&shift.id, &reviewer, AdminDecision::Reject, "not the enrolled driver")
        .await
        .unwrap();
    assert_eq!(record.status, VerificationStatus::Rejected);

    // The driver may retry after an admin rejection
    fleet.score("retry.jpg", 99.0);
    fleet
        .engine
        .submit_verification(&shift.id, "retry.jpg")
        .await
        .unwrap();
    assert_eq!(
        fleet.shift(&shift.id).verification_status,
        VerificationStatus::Verified
    );
    assert_eq!(fleet.engine.verification_history(&shift.id).unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_driver_profile() {
    let fleet = TestFleet::new();
    let shift = fleet
        .engine
        .start_shift(&DriverId::new("never-enrolled"))
        .await
        .unwrap();
    let err = fleet
        .engine
        .submit_verification(&shift.id, "selfie.jpg")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}
