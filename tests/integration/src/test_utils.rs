//! Test utilities for cross-crate integration tests

use fleetops_core::{DriverId, EngineConfig, ShiftId, TripId, VehicleId};
use fleetops_domain::{
    Location, Passenger, Shift, ShiftStatus, Trip, TripDetails, TripStatus, VehicleAssignment,
    VerificationRecord, VerificationStatus,
};
use fleetops_engine::FleetEngine;
use fleetops_live::{Broadcaster, TrackingStream};
use fleetops_store::{FleetStore, MemoryStore, StoreError, StoreResult};
use fleetops_verification::{DeviceTrust, FixedScoreMatcher, InMemoryProfiles};
use std::collections::HashSet;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

/// Initialize tracing once for the whole test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// A fully wired fleet: engine publishing into a broadcaster, with a
/// tracking stream over the same store.
pub struct TestFleet {
    pub engine: Arc<FleetEngine>,
    pub store: Arc<dyn FleetStore>,
    pub broadcaster: Broadcaster,
    pub tracking: Arc<TrackingStream>,
    pub matcher: Arc<FixedScoreMatcher>,
    pub profiles: Arc<InMemoryProfiles>,
}

impl TestFleet {
    /// Fleet over an in-memory store.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), EngineConfig::default())
    }

    /// Fleet over a [`FaultyStore`], returned alongside for arming faults.
    pub fn faulty() -> (Self, Arc<FaultyStore>) {
        let store = Arc::new(FaultyStore::new());
        let fleet = Self::with_store(store.clone(), EngineConfig::default());
        (fleet, store)
    }

    /// Fleet over any store.
    pub fn with_store(store: Arc<dyn FleetStore>, config: EngineConfig) -> Self {
        init_tracing();
        let broadcaster = Broadcaster::new(256);
        let tracking = Arc::new(TrackingStream::new(Arc::clone(&store), 256));
        let matcher = Arc::new(FixedScoreMatcher::new());
        let profiles = Arc::new(InMemoryProfiles::new());

        let engine = FleetEngine::new(Arc::clone(&store), matcher.clone(), profiles.clone())
            .with_event_sink(Arc::new(broadcaster.clone()))
            .with_tracking(Arc::clone(&tracking))
            .with_config(config);

        Self {
            engine: Arc::new(engine),
            store,
            broadcaster,
            tracking,
            matcher,
            profiles,
        }
    }

    /// Enroll a driver with a reference photo on a trusted device.
    pub fn enroll(&self, driver: &str) -> DriverId {
        let driver_id = DriverId::new(driver);
        self.profiles.enroll(
            driver_id.clone(),
            format!("photos/{}/reference.jpg", driver),
            DeviceTrust::Trusted,
        );
        driver_id
    }

    /// Program the matcher's answer for a selfie.
    pub fn score(&self, selfie: &str, score: f64) {
        self.matcher.set_score(selfie, score);
    }

    /// Enroll, clock in, verify, check in `vehicle` and activate.
    pub async fn active_shift(&self, driver: &str, vehicle: &str) -> Shift {
        let driver_id = self.enroll(driver);
        let shift = self
            .engine
            .start_shift(&driver_id)
            .await
            .expect("start shift");
        let selfie = format!("selfies/{}/{}.jpg", driver, shift.id);
        self.score(&selfie, 95.0);
        self.engine
            .submit_verification(&shift.id, &selfie)
            .await
            .expect("submit selfie");
        self.engine
            .attach_vehicle(&shift.id, &VehicleId::new(vehicle))
            .await
            .expect("attach vehicle");
        self.engine.activate(&shift.id).await.expect("activate")
    }

    /// Shifts currently open for `driver` according to the store.
    pub fn open_shift_count(&self, driver: &DriverId) -> usize {
        self.store
            .open_shifts()
            .expect("open shifts")
            .iter()
            .filter(|s| &s.driver_id == driver)
            .count()
    }

    /// Active assignments referencing `vehicle` according to the store.
    pub fn active_assignment_count(&self, vehicle: &VehicleId) -> usize {
        self.store
            .active_assignments()
            .expect("active assignments")
            .iter()
            .filter(|a| &a.vehicle_id == vehicle)
            .count()
    }

    pub fn shift(&self, shift_id: &ShiftId) -> Shift {
        self.engine.shift(shift_id).expect("shift exists")
    }
}

impl Default for TestFleet {
    fn default() -> Self {
        Self::new()
    }
}

/// A typical airport run.
pub fn airport_run() -> TripDetails {
    TripDetails {
        pickup: Location {
            address: "12 Canal Street".to_string(),
            lat: Some(52.3702),
            lng: Some(4.8952),
        },
        dropoff: Location::address("Airport Departures Hall 2"),
        price_cents: 5_200,
        scheduled_at: None,
        passengers: vec![
            Passenger {
                name: "A. Jansen".to_string(),
                phone: "+31600000001".to_string(),
                pickup_note: Some("blue door".to_string()),
                bag_count: 2,
            },
            Passenger {
                name: "B. Jansen".to_string(),
                phone: "+31600000002".to_string(),
                pickup_note: None,
                bag_count: 1,
            },
        ],
    }
}

/// Write operations a [`FaultyStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    UpdateShift,
    InsertAssignment,
    ReleaseAssignment,
    UpdateTrip,
    InsertVerification,
    UpdateVerification,
}

/// In-memory store whose writes can be made to fail on demand.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    armed: Mutex<HashSet<StoreOp>>,
    stall: Mutex<Option<(mpsc::Sender<()>, Duration)>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call of `op`; later calls succeed again.
    pub fn fail_next(&self, op: StoreOp) {
        self.armed.lock().unwrap().insert(op);
    }

    /// The next `get_shift` reads, signals the returned receiver, then
    /// holds its answer for `delay`.
    pub fn stall_next_get_shift(&self, delay: Duration) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel();
        *self.stall.lock().unwrap() = Some((tx, delay));
        rx
    }

    fn check(&self, op: StoreOp) -> StoreResult<()> {
        if self.armed.lock().unwrap().remove(&op) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("injected failure in {:?}", op),
            )));
        }
        Ok(())
    }
}

impl FleetStore for FaultyStore {
    fn insert_shift(&self, shift: &Shift) -> StoreResult<()> {
        self.inner.insert_shift(shift)
    }

    fn get_shift(&self, id: &ShiftId) -> StoreResult<Option<Shift>> {
        let shift = self.inner.get_shift(id)?;
        let stall = self.stall.lock().unwrap().take();
        if let Some((started, delay)) = stall {
            let _ = started.send(());
            std::thread::sleep(delay);
        }
        Ok(shift)
    }

    fn update_shift(
        &self,
        shift: &Shift,
        expected_status: ShiftStatus,
        expected_verification: VerificationStatus,
    ) -> StoreResult<()> {
        self.check(StoreOp::UpdateShift)?;
        self.inner
            .update_shift(shift, expected_status, expected_verification)
    }

    fn open_shift_for_driver(&self, driver_id: &DriverId) -> StoreResult<Option<Shift>> {
        self.inner.open_shift_for_driver(driver_id)
    }

    fn open_shifts(&self) -> StoreResult<Vec<Shift>> {
        self.inner.open_shifts()
    }

    fn insert_assignment(&self, assignment: &VehicleAssignment) -> StoreResult<()> {
        self.check(StoreOp::InsertAssignment)?;
        self.inner.insert_assignment(assignment)
    }

    fn release_assignment(&self, assignment: &VehicleAssignment) -> StoreResult<()> {
        self.check(StoreOp::ReleaseAssignment)?;
        self.inner.release_assignment(assignment)
    }

    fn active_assignment_for_vehicle(
        &self,
        vehicle_id: &VehicleId,
    ) -> StoreResult<Option<VehicleAssignment>> {
        self.inner.active_assignment_for_vehicle(vehicle_id)
    }

    fn active_assignment_for_shift(
        &self,
        shift_id: &ShiftId,
    ) -> StoreResult<Option<VehicleAssignment>> {
        self.inner.active_assignment_for_shift(shift_id)
    }

    fn active_assignments(&self) -> StoreResult<Vec<VehicleAssignment>> {
        self.inner.active_assignments()
    }

    fn insert_trip(&self, trip: &Trip) -> StoreResult<()> {
        self.inner.insert_trip(trip)
    }

    fn get_trip(&self, id: &TripId) -> StoreResult<Option<Trip>> {
        self.inner.get_trip(id)
    }

    fn update_trip(&self, trip: &Trip, expected_status: TripStatus) -> StoreResult<()> {
        self.check(StoreOp::UpdateTrip)?;
        self.inner.update_trip(trip, expected_status)
    }

    fn trips_for_shift(&self, shift_id: &ShiftId) -> StoreResult<Vec<Trip>> {
        self.inner.trips_for_shift(shift_id)
    }

    fn trips_for_driver(&self, driver_id: &DriverId) -> StoreResult<Vec<Trip>> {
        self.inner.trips_for_driver(driver_id)
    }

    fn in_progress_trip_for_shift(&self, shift_id: &ShiftId) -> StoreResult<Option<Trip>> {
        self.inner.in_progress_trip_for_shift(shift_id)
    }

    fn insert_verification(&self, record: &VerificationRecord) -> StoreResult<()> {
        self.check(StoreOp::InsertVerification)?;
        self.inner.insert_verification(record)
    }

    fn update_verification(
        &self,
        record: &VerificationRecord,
        expected_status: VerificationStatus,
    ) -> StoreResult<()> {
        self.check(StoreOp::UpdateVerification)?;
        self.inner.update_verification(record, expected_status)
    }

    fn latest_verification(&self, shift_id: &ShiftId) -> StoreResult<Option<VerificationRecord>> {
        self.inner.latest_verification(shift_id)
    }

    fn verifications_for_shift(&self, shift_id: &ShiftId) -> StoreResult<Vec<VerificationRecord>> {
        self.inner.verifications_for_shift(shift_id)
    }
}
