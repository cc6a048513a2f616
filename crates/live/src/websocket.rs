//! WebSocket transport for the live feed.
//!
//! One task per connection. The client must open with a `subscribe`
//! frame inside the handshake window; after that the task multiplexes
//! client frames, visible domain events and (for admins) driver
//! positions onto the socket. A failed send drops the connection; the
//! broadcaster never waits on a socket.

use crate::broadcaster::{Broadcaster, Delivery, Role, SubscriberInfo};
use crate::schema::{ClientFrame, ServerFrame};
use crate::tracking::{PositionFeed, PositionSample, TrackingError, TrackingStream};
use futures_util::{Sink, SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Default time a client has to send its `subscribe` frame.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Client did not subscribe within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),
}

/// Live feed server.
pub struct WsServer {
    addr: SocketAddr,
    greeting: String,
    handshake_timeout: Duration,
    broadcaster: Broadcaster,
    tracking: Arc<TrackingStream>,
}

impl WsServer {
    /// Create a server bound to `addr` once run.
    pub fn new(addr: SocketAddr, broadcaster: Broadcaster, tracking: Arc<TrackingStream>) -> Self {
        Self {
            addr,
            greeting: "Connected to FleetOps live feed".to_string(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            broadcaster,
            tracking,
        }
    }

    /// Override the `ack` message text.
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    /// Override the subscribe window.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Configured listen address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bind the configured address and serve forever.
    pub async fn run(self: Arc<Self>) -> Result<(), TransportError> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), TransportError> {
        info!("Live feed listening on {}", listener.local_addr()?);

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!("New WebSocket connection from {}", peer_addr);
                    let server = Arc::clone(&self);

                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, peer_addr).await {
                            warn!("WebSocket connection {} ended: {}", peer_addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), TransportError> {
        let ws_stream = accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let first = tokio::time::timeout(self.handshake_timeout, ws_receiver.next())
            .await
            .map_err(|_| TransportError::HandshakeTimeout(self.handshake_timeout))?;
        let (role, user_id) = match first {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(ClientFrame::Subscribe { role, user_id }) if !user_id.trim().is_empty() => {
                    (role, user_id)
                }
                _ => {
                    let frame = ServerFrame::error("SUBSCRIBE_REQUIRED", "first frame must be subscribe");
                    send_frame(&mut ws_sender, &frame).await?;
                    return Err(TransportError::Protocol(
                        "first frame was not a subscribe".to_string(),
                    ));
                }
            },
            Some(Ok(_)) | None => return Ok(()),
            Some(Err(e)) => return Err(e.into()),
        };

        let mut subscription = self.broadcaster.subscribe(role, user_id);
        let mut positions = match role {
            Role::Admin => Some(self.tracking.subscribe(role)?),
            Role::Driver => None,
        };
        let info = subscription.info().clone();

        let ack = ServerFrame::Ack {
            message: self.greeting.clone(),
            connection_id: info.connection_id.clone(),
        };
        send_frame(&mut ws_sender, &ack).await?;

        loop {
            let outbound = tokio::select! {
                msg = ws_receiver.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.handle_client_frame(&info, &text),
                    Some(Ok(Message::Ping(payload))) => {
                        if ws_sender.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                        None
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client {} disconnected", peer_addr);
                        break;
                    }
                    Some(Ok(_)) => None,
                    Some(Err(e)) => {
                        warn!("Error receiving from {}: {}", peer_addr, e);
                        break;
                    }
                },

                delivery = subscription.recv() => match delivery {
                    Some(Delivery::Event(event)) => Some(ServerFrame::Event {
                        event: (*event).clone(),
                    }),
                    Some(Delivery::Lagged(missed)) => Some(ServerFrame::Lagged { missed }),
                    None => break,
                },

                Some(sample) = next_position(&mut positions) => {
                    Some(ServerFrame::DriverPosition((*sample).clone()))
                }
            };

            if let Some(frame) = outbound {
                if let Err(e) = send_frame(&mut ws_sender, &frame).await {
                    warn!("Error sending to {}: {}", peer_addr, e);
                    break;
                }
            }
        }

        Ok(())
    }

    fn handle_client_frame(&self, info: &SubscriberInfo, text: &str) -> Option<ServerFrame> {
        match serde_json::from_str::<ClientFrame>(text) {
            Ok(ClientFrame::Ping) => Some(ServerFrame::Pong),
            Ok(ClientFrame::Subscribe { .. }) => Some(ServerFrame::error(
                "ALREADY_SUBSCRIBED",
                "connection is already subscribed",
            )),
            Ok(ClientFrame::Position(sample)) => {
                if info.role != Role::Driver || sample.driver_id.as_str() != info.user_id {
                    return Some(ServerFrame::error(
                        "NOT_AUTHORIZED",
                        "positions may only be reported for the subscribed driver",
                    ));
                }
                match self.tracking.ingest(sample) {
                    Ok(_) => None,
                    Err(e) => Some(ServerFrame::error(e.code(), e.to_string())),
                }
            }
            Err(e) => Some(ServerFrame::error("MALFORMED_FRAME", e.to_string())),
        }
    }
}

async fn next_position(feed: &mut Option<PositionFeed>) -> Option<Arc<PositionSample>> {
    match feed {
        Some(feed) => feed.recv().await,
        None => std::future::pending().await,
    }
}

async fn send_frame<S>(sink: &mut S, frame: &ServerFrame) -> Result<(), TransportError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(frame)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}
