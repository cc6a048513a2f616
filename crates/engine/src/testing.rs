//! Shared fixtures for the engine's unit tests.

use crate::FleetEngine;
use fleetops_core::{DriverId, EngineConfig, MemorySink, VehicleId};
use fleetops_domain::{Location, Passenger, Shift, TripDetails};
use fleetops_store::MemoryStore;
use fleetops_verification::{DeviceTrust, FixedScoreMatcher, InMemoryProfiles};
use std::sync::Arc;

pub(crate) struct Harness {
    pub engine: Arc<FleetEngine>,
    pub sink: Arc<MemorySink>,
    pub matcher: Arc<FixedScoreMatcher>,
    pub profiles: Arc<InMemoryProfiles>,
}

impl Harness {
    fn build(config: EngineConfig) -> Self {
        let sink = Arc::new(MemorySink::new());
        let matcher = Arc::new(FixedScoreMatcher::new());
        let profiles = Arc::new(InMemoryProfiles::new());
        let engine = FleetEngine::new(Arc::new(MemoryStore::new()), matcher.clone(), profiles.clone())
            .with_event_sink(sink.clone())
            .with_config(config);
        Self {
            engine: Arc::new(engine),
            sink,
            matcher,
            profiles,
        }
    }

    pub fn with_auto_activate() -> Self {
        Self::build(EngineConfig {
            auto_activate: true,
        })
    }

    pub fn details() -> TripDetails {
        TripDetails {
            pickup: Location::address("Central Station"),
            dropoff: Location::address("Airport T1"),
            price_cents: 3_900,
            scheduled_at: None,
            passengers: vec![Passenger {
                name: "J. Smith".into(),
                phone: "+15550100".into(),
                pickup_note: None,
                bag_count: 1,
            }],
        }
    }

    /// Enroll a trusted driver and clock them in.
    pub async fn start_enrolled(&self, driver: &str) -> Shift {
        let driver_id = DriverId::new(driver);
        self.profiles
            .enroll(driver_id.clone(), format!("ref://{}", driver), DeviceTrust::Trusted);
        self.engine.start_shift(&driver_id).await.unwrap()
    }
}

pub(crate) fn engine() -> Harness {
    Harness::build(EngineConfig::default())
}

/// A pending shift whose verification passed.
pub(crate) async fn verified_shift(h: &Harness, driver: &str) -> Shift {
    let shift = h.start_enrolled(driver).await;
    let selfie = format!("selfie://{}", driver);
    h.matcher.set_score(selfie.clone(), 97.0);
    h.engine
        .submit_verification(&shift.id, &selfie)
        .await
        .unwrap();
    shift
}

/// A verified shift with a vehicle, activated.
pub(crate) async fn active_shift(h: &Harness, driver: &str, vehicle: &str) -> Shift {
    let shift = verified_shift(h, driver).await;
    h.engine
        .attach_vehicle(&shift.id, &VehicleId::new(vehicle))
        .await
        .unwrap();
    h.engine.activate(&shift.id).await.unwrap()
}
