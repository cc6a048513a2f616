//! Wire frames for the live WebSocket feed.
//!
//! Every frame is a JSON text message tagged by `type`. The first client
//! frame must be `subscribe`; after the `ack`, drivers may stream
//! `position` frames and admins additionally receive `driver_position`.

use crate::broadcaster::Role;
use crate::tracking::PositionSample;
use fleetops_core::{ConnectionId, DomainEvent};
use serde::{Deserialize, Serialize};

/// Client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Opening handshake.
    Subscribe {
        /// Admin or driver
        role: Role,
        /// Driver id for drivers, admin id for admins
        user_id: String,
    },

    /// Position fix from a driver device.
    Position(PositionSample),

    /// Keepalive.
    Ping,
}

/// Server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Subscription accepted.
    Ack {
        /// Human-readable status message
        message: String,
        /// Identifier assigned to this connection
        connection_id: ConnectionId,
    },

    /// Domain event visible to this subscriber.
    Event {
        /// The event
        event: DomainEvent,
    },

    /// Latest position of a driver (admins only).
    DriverPosition(PositionSample),

    /// The connection fell behind and `missed` events were dropped.
    Lagged {
        /// Number of dropped events
        missed: u64,
    },

    /// A client frame was refused.
    Error {
        /// Stable error code
        code: String,
        /// Detail
        message: String,
    },

    /// Keepalive reply.
    Pong,
}

impl ServerFrame {
    /// Error frame from a code and message.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerFrame::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}
