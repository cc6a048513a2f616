//! Live feed over a real WebSocket connection.

use crate::test_utils::TestFleet;
use fleetops_core::{event_types, DriverId};
use fleetops_live::{ClientFrame, PositionSample, Role, ServerFrame, WsServer};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(fleet: &TestFleet) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(WsServer::new(
        addr,
        fleet.broadcaster.clone(),
        Arc::clone(&fleet.tracking),
    ));
    tokio::spawn(server.serve(listener));
    format!("ws://{}", addr)
}

async fn send(client: &mut Client, frame: &ClientFrame) {
    let json = serde_json::to_string(frame).unwrap();
    client.send(Message::Text(json)).await.unwrap();
}

async fn recv(client: &mut Client) -> ServerFrame {
    let next = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("connection ended: {:?}", other),
            }
        }
    });
    next.await.expect("frame within timeout")
}

async fn connect(url: &str, role: Role, user_id: &str) -> Client {
    let (mut client, _) = connect_async(url).await.unwrap();
    send(
        &mut client,
        &ClientFrame::Subscribe {
            role,
            user_id: user_id.to_string(),
        },
    )
    .await;
    match recv(&mut client).await {
        ServerFrame::Ack { .. } => client,
        other => panic!("expected ack, got {:?}", other),
    }
}

#[tokio::test]
async fn test_driver_position_reaches_admin() {
    let fleet = TestFleet::new();
    let shift = fleet.active_shift("driver-p", "vehicle-p").await;
    let url = serve(&fleet).await;

    let mut admin = connect(&url, Role::Admin, "admin-1").await;
    let mut driver = connect(&url, Role::Driver, shift.driver_id.as_str()).await;

    let sample = PositionSample {
        driver_id: shift.driver_id.clone(),
        shift_id: shift.id.clone(),
        trip_id: None,
        lat: 52.37,
        lng: 4.89,
        heading: Some(180.0),
        speed: Some(12.5),
        accuracy: Some(4.0),
        timestamp: fleetops_core::time::now_ms(),
    };
    send(&mut driver, &ClientFrame::Position(sample.clone())).await;

    match recv(&mut admin).await {
        ServerFrame::DriverPosition(received) => assert_eq!(received, sample),
        other => panic!("unexpected frame {:?}", other),
    }
    assert_eq!(fleet.tracking.latest_positions().len(), 1);
}

#[tokio::test]
async fn test_pending_shift_position_rejected() {
    let fleet = TestFleet::new();
    let driver_id = fleet.enroll("driver-q");
    let shift = fleet.engine.start_shift(&driver_id).await.unwrap();
    let url = serve(&fleet).await;

    let mut driver = connect(&url, Role::Driver, driver_id.as_str()).await;
    send(
        &mut driver,
        &ClientFrame::Position(PositionSample {
            driver_id: driver_id.clone(),
            shift_id: shift.id.clone(),
            trip_id: None,
            lat: 0.0,
            lng: 0.0,
            heading: None,
            speed: None,
            accuracy: None,
            timestamp: 1,
        }),
    )
    .await;

    match recv(&mut driver).await {
        ServerFrame::Error { code, .. } => assert_eq!(code, "SHIFT_NOT_ACTIVE"),
        other => panic!("unexpected frame {:?}", other),
    }
    assert!(fleet.tracking.latest_positions().is_empty());
}

#[tokio::test]
async fn test_engine_events_are_routed_by_audience() {
    let fleet = TestFleet::new();
    let url = serve(&fleet).await;
    let mut alice = connect(&url, Role::Driver, "alice").await;
    let mut admin = connect(&url, Role::Admin, "admin-1").await;

    fleet
        .engine
        .assign_trip(&DriverId::new("bob"), crate::test_utils::airport_run())
        .await
        .unwrap();
    let trip = fleet
        .engine
        .assign_trip(&DriverId::new("alice"), crate::test_utils::airport_run())
        .await
        .unwrap();

    // Alice only sees her own trip
    match recv(&mut alice).await {
        ServerFrame::Event { event } => {
            assert_eq!(event.event_type, event_types::TRIP_ASSIGNED);
            assert_eq!(event.entity_id, trip.id.to_string());
        }
        other => panic!("unexpected frame {:?}", other),
    }

    // Admins see both, in emission order
    let first = recv(&mut admin).await;
    let second = recv(&mut admin).await;
    match (first, second) {
        (ServerFrame::Event { event: a }, ServerFrame::Event { event: b }) => {
            assert!(a.seq < b.seq);
            assert_eq!(b.entity_id, trip.id.to_string());
        }
        other => panic!("unexpected frames {:?}", other),
    }
}

#[tokio::test]
async fn test_close_forgets_position() {
    let fleet = TestFleet::new();
    let shift = fleet.active_shift("driver-r", "vehicle-r").await;
    fleet
        .tracking
        .ingest(PositionSample {
            driver_id: shift.driver_id.clone(),
            shift_id: shift.id.clone(),
            trip_id: None,
            lat: 10.0,
            lng: 10.0,
            heading: None,
            speed: None,
            accuracy: None,
            timestamp: 5,
        })
        .unwrap();
    assert!(fleet.tracking.latest_for(&shift.driver_id).is_some());

    fleet
        .engine
        .close_shift(
            &shift.id,
            None,
            fleetops_domain::Actor::Driver(shift.driver_id.clone()),
        )
        .await
        .unwrap();
    assert!(fleet.tracking.latest_for(&shift.driver_id).is_none());
}
