//! In-process publish/subscribe hub for domain events.
//!
//! All events travel through one bounded `tokio::sync::broadcast` ring.
//! Each [`Subscription`] filters the ring by audience: admins see every
//! event, drivers only events addressed to them. A subscriber that falls
//! more than the ring's capacity behind loses the oldest events and is told
//! how many it missed; nobody else is slowed down.
//!
//! Publishing assigns a sequence number and enqueues under one mutex, so
//! every subscriber observes events in emission order, which covers the
//! per-entity ordering requirement.

#![warn(missing_docs)]

use fleetops_core::{ConnectionId, DomainEvent, DriverId, EventSink};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, info, warn};

/// Subscriber role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Dispatch / admin console
    Admin,
    /// Driver app
    Driver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            Role::Driver => f.write_str("driver"),
        }
    }
}

/// A live subscriber connection as seen by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberInfo {
    /// Connection identifier
    pub connection_id: ConnectionId,
    /// Admin or driver
    pub role: Role,
    /// User behind the connection (driver id for drivers)
    pub user_id: String,
    /// Connect time (Unix epoch milliseconds)
    pub connected_at: u64,
}

impl SubscriberInfo {
    /// Whether this subscriber may observe `event`.
    pub fn can_see(&self, event: &DomainEvent) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Driver => event
                .audience
                .driver()
                .map(|d| d.as_str() == self.user_id)
                .unwrap_or(false),
        }
    }
}

/// What a subscription yields.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// A visible event
    Event(Arc<DomainEvent>),
    /// The subscriber fell behind and `n` events (of any audience) were
    /// dropped; the client should re-fetch authoritative state
    Lagged(u64),
}

struct Inner {
    tx: broadcast::Sender<Arc<DomainEvent>>,
    /// Next sequence number; held while enqueueing to keep ring order == seq order
    next_seq: Mutex<u64>,
    registry: RwLock<HashMap<ConnectionId, SubscriberInfo>>,
    published: AtomicU64,
}

/// Domain event broadcaster. Cheap to clone; clones share one hub.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl Broadcaster {
    /// Default ring capacity.
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Create a broadcaster with a ring of `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                tx,
                next_seq: Mutex::new(1),
                registry: RwLock::new(HashMap::new()),
                published: AtomicU64::new(0),
            }),
        }
    }

    /// Register a connection and start receiving from this point on.
    pub fn subscribe(&self, role: Role, user_id: impl Into<String>) -> Subscription {
        let info = SubscriberInfo {
            connection_id: ConnectionId::generate(),
            role,
            user_id: user_id.into(),
            connected_at: fleetops_core::time::now_ms(),
        };
        let rx = self.inner.tx.subscribe();
        match self.inner.registry.write() {
            Ok(mut registry) => {
                registry.insert(info.connection_id.clone(), info.clone());
            }
            Err(poisoned) => {
                poisoned
                    .into_inner()
                    .insert(info.connection_id.clone(), info.clone());
            }
        }
        info!(
            connection_id = %info.connection_id,
            role = %info.role,
            user_id = %info.user_id,
            "Subscriber connected"
        );
        Subscription {
            info,
            rx,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Publish an event to every visible subscriber. Returns the assigned
    /// sequence number.
    ///
    /// Never blocks on subscribers and never fails: with nobody listening
    /// the event is simply dropped.
    pub fn broadcast(&self, mut event: DomainEvent) -> u64 {
        let mut next_seq = match self.inner.next_seq.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let seq = *next_seq;
        *next_seq += 1;
        event.seq = seq;

        debug!(
            seq,
            event_type = %event.event_type,
            entity_id = %event.entity_id,
            audience = %event.audience,
            "Broadcasting event"
        );
        // Err only means there are no receivers right now
        let _ = self.inner.tx.send(Arc::new(event));
        self.inner.published.fetch_add(1, Ordering::Relaxed);
        seq
    }

    /// Number of registered connections.
    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Snapshot of registered connections.
    pub fn connections(&self) -> Vec<SubscriberInfo> {
        let mut connections: Vec<SubscriberInfo> = self
            .inner
            .registry
            .read()
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default();
        connections.sort_by_key(|c| c.connected_at);
        connections
    }

    /// Connections belonging to one driver.
    pub fn driver_connections(&self, driver_id: &DriverId) -> usize {
        self.connections()
            .iter()
            .filter(|c| c.role == Role::Driver && c.user_id == driver_id.as_str())
            .count()
    }

    /// Total events published since start.
    pub fn published_count(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl EventSink for Broadcaster {
    fn publish(&self, event: DomainEvent) {
        self.broadcast(event);
    }
}

/// One subscriber's view of the event ring.
///
/// Dropping it unregisters the connection.
pub struct Subscription {
    info: SubscriberInfo,
    rx: broadcast::Receiver<Arc<DomainEvent>>,
    inner: Arc<Inner>,
}

impl Subscription {
    /// Registry entry for this subscription.
    pub fn info(&self) -> &SubscriberInfo {
        &self.info
    }

    /// Connection identifier.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.info.connection_id
    }

    fn on_lagged(&self, missed: u64) -> Delivery {
        warn!(
            connection_id = %self.info.connection_id,
            missed,
            "Subscriber lagging, oldest events dropped"
        );
        Delivery::Lagged(missed)
    }

    /// Wait for the next visible event.
    ///
    /// Returns `None` once the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<Delivery> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.info.can_see(&event) => return Some(Delivery::Event(event)),
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => return Some(self.on_lagged(missed)),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next visible event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.info.can_see(&event) => return Some(Delivery::Event(event)),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(missed)) => return Some(self.on_lagged(missed)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drain every queued visible event.
    pub fn drain(&mut self) -> Vec<Delivery> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let removed = match self.inner.registry.write() {
            Ok(mut registry) => registry.remove(&self.info.connection_id),
            Err(poisoned) => poisoned.into_inner().remove(&self.info.connection_id),
        };
        if removed.is_some() {
            info!(connection_id = %self.info.connection_id, "Subscriber disconnected");
        }
    }
}
