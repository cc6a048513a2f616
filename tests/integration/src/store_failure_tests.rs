//! A failed store write leaves every record, lock and feed as it was.

use crate::test_utils::{airport_run, StoreOp, TestFleet};
use fleetops_core::{AdminId, VehicleId};
use fleetops_domain::{Actor, AdminDecision, ShiftStatus, TripStatus, VerificationStatus};
use fleetops_live::{PositionSample, Role};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_close_failure_keeps_trip_and_vehicle() {
    let (fleet, store) = TestFleet::faulty();
    let shift = fleet.active_shift("driver-a", "vehicle-1").await;
    let trip = fleet
        .engine
        .assign_trip(&shift.driver_id, airport_run())
        .await
        .unwrap();
    fleet.engine.start_trip(&trip.id).await.unwrap();
    let mut admin_feed = fleet.broadcaster.subscribe(Role::Admin, "admin-1");
    let admin = Actor::Admin(AdminId::new("admin-1"));

    for op in [StoreOp::UpdateShift, StoreOp::ReleaseAssignment, StoreOp::UpdateTrip] {
        store.fail_next(op);
        let err = fleet
            .engine
            .close_shift(&shift.id, Some("vehicle recalled"), admin.clone())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STORE_FAILURE", "failing {:?}", op);

        assert_eq!(fleet.shift(&shift.id).status, ShiftStatus::Active);
        assert_eq!(
            fleet.engine.trip(&trip.id).unwrap().status,
            TripStatus::InProgress
        );
        assert!(fleet.engine.active_assignment(&shift.id).unwrap().is_some());
        assert!(fleet.engine.locks().is_held("vehicle:vehicle-1"));
        assert!(fleet.engine.locks().is_held("driver:driver-a"));
        assert!(admin_feed.drain().is_empty());
    }

    // The vehicle never became free for another shift
    let other = fleet.engine.start_shift(&fleet.enroll("driver-b")).await.unwrap();
    let err = fleet
        .engine
        .attach_vehicle(&other.id, &VehicleId::new("vehicle-1"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VEHICLE_ALREADY_ASSIGNED");

    // Once the store recovers the close goes through as usual
    let closed = fleet
        .engine
        .close_shift(&shift.id, Some("vehicle recalled"), admin)
        .await
        .unwrap();
    assert_eq!(closed.status, ShiftStatus::Closed);
    assert_eq!(
        fleet.engine.trip(&trip.id).unwrap().status,
        TripStatus::Cancelled
    );
    assert!(!fleet.engine.locks().is_held("vehicle:vehicle-1"));
}

#[tokio::test]
async fn test_attach_failure_frees_vehicle() {
    let (fleet, store) = TestFleet::faulty();
    let driver = fleet.enroll("driver-a");
    let shift = fleet.engine.start_shift(&driver).await.unwrap();
    let vehicle = VehicleId::new("vehicle-1");

    for op in [StoreOp::InsertAssignment, StoreOp::UpdateShift] {
        store.fail_next(op);
        let err = fleet
            .engine
            .attach_vehicle(&shift.id, &vehicle)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STORE_FAILURE", "failing {:?}", op);
        assert!(!fleet.engine.locks().is_held("vehicle:vehicle-1"));
        assert_eq!(fleet.active_assignment_count(&vehicle), 0);
        assert_eq!(fleet.shift(&shift.id).vehicle_id, None);
    }

    fleet.engine.attach_vehicle(&shift.id, &vehicle).await.unwrap();
    assert_eq!(fleet.active_assignment_count(&vehicle), 1);
}

#[tokio::test]
async fn test_submit_failure_leaves_attempt_open() {
    let (fleet, store) = TestFleet::faulty();
    let driver = fleet.enroll("driver-a");
    let shift = fleet.engine.start_shift(&driver).await.unwrap();
    fleet.score("selfie.jpg", 95.0);

    for op in [StoreOp::UpdateShift, StoreOp::InsertVerification] {
        store.fail_next(op);
        let err = fleet
            .engine
            .submit_verification(&shift.id, "selfie.jpg")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STORE_FAILURE", "failing {:?}", op);
        assert_eq!(
            fleet.shift(&shift.id).verification_status,
            VerificationStatus::Unverified
        );
        assert!(fleet
            .engine
            .verification_history(&shift.id)
            .unwrap()
            .is_empty());
    }

    let record = fleet
        .engine
        .submit_verification(&shift.id, "selfie.jpg")
        .await
        .unwrap();
    assert_eq!(record.status, VerificationStatus::Verified);
}

#[tokio::test]
async fn test_admin_decision_failure_can_be_retried() {
    let (fleet, store) = TestFleet::faulty();
    let driver = fleet.enroll("driver-a");
    let shift = fleet.engine.start_shift(&driver).await.unwrap();
    fleet.score("ambiguous.jpg", 70.0);
    fleet
        .engine
        .submit_verification(&shift.id, "ambiguous.jpg")
        .await
        .unwrap();
    let reviewer = AdminId::new("admin-1");

    for op in [StoreOp::UpdateShift, StoreOp::UpdateVerification] {
        store.fail_next(op);
        let err = fleet
            .engine
            .admin_decide(&shift.id, &reviewer, AdminDecision::Approve, "")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STORE_FAILURE", "failing {:?}", op);
        assert_eq!(
            fleet.shift(&shift.id).verification_status,
            VerificationStatus::ManualReview
        );
        let history = fleet.engine.verification_history(&shift.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, VerificationStatus::ManualReview);
    }

    let record = fleet
        .engine
        .admin_decide(&shift.id, &reviewer, AdminDecision::Approve, "")
        .await
        .unwrap();
    assert_eq!(record.status, VerificationStatus::Verified);
    assert_eq!(
        fleet.shift(&shift.id).verification_status,
        VerificationStatus::Verified
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_position_racing_close_is_not_kept() {
    let (fleet, store) = TestFleet::faulty();
    let shift = fleet.active_shift("driver-a", "vehicle-1").await;

    // The sample's shift lookup sees Active, then stalls while the shift closes
    let started = store.stall_next_get_shift(Duration::from_millis(200));
    let tracking = Arc::clone(&fleet.tracking);
    let sample = PositionSample {
        driver_id: shift.driver_id.clone(),
        shift_id: shift.id.clone(),
        trip_id: None,
        lat: 52.0,
        lng: 4.0,
        heading: None,
        speed: None,
        accuracy: None,
        timestamp: 5,
    };
    let ingest = std::thread::spawn(move || tracking.ingest(sample));
    started.recv_timeout(Duration::from_secs(5)).unwrap();

    fleet
        .engine
        .close_shift(&shift.id, None, Actor::Driver(shift.driver_id.clone()))
        .await
        .unwrap();
    let _ = ingest.join().unwrap();

    assert!(fleet.tracking.latest_for(&shift.driver_id).is_none());
    assert!(fleet.tracking.latest_positions().is_empty());
}
