//! Process wiring: one store, one engine, one broadcaster per node.

use anyhow::{Context, Result};
use fleetops_core::{Config, StorageConfig};
use fleetops_engine::FleetEngine;
use fleetops_live::{Broadcaster, TrackingStream, WsServer};
use fleetops_store::{FleetStore, MemoryStore, SqliteStore};
use fleetops_verification::{FixedScoreMatcher, InMemoryProfiles, VerificationPolicy};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub struct NodeState {
    pub engine: Arc<FleetEngine>,
    pub broadcaster: Broadcaster,
    pub tracking: Arc<TrackingStream>,
    pub ws: Arc<WsServer>,
}

impl NodeState {
    pub fn build(config: &Config) -> Result<Self> {
        let store = open_store(&config.storage)?;

        let broadcaster = Broadcaster::new(config.broadcast.event_capacity);
        let tracking = Arc::new(TrackingStream::new(
            Arc::clone(&store),
            config.broadcast.tracking_capacity,
        ));

        let profiles = InMemoryProfiles::from_config(&config.verification)
            .context("invalid [[verification.drivers]] entry")?;
        info!(enrolled = profiles.len(), "Driver profiles loaded");

        // No matcher backend is wired into the node: selfies of enrolled
        // drivers on trusted or unrecognized devices fail to score and are
        // parked for manual review; revoked devices are rejected outright.
        let engine = FleetEngine::new(
            store,
            Arc::new(FixedScoreMatcher::new()),
            Arc::new(profiles),
        )
        .with_event_sink(Arc::new(broadcaster.clone()))
        .with_policy(VerificationPolicy::from_config(&config.verification))
        .with_tracking(Arc::clone(&tracking))
        .with_config(config.engine.clone());

        let held = engine
            .recover_locks()
            .context("failed to recover locks from store")?;
        info!(held, "Lock table ready");

        let addr: SocketAddr = config
            .server
            .ws_addr
            .parse()
            .with_context(|| format!("invalid server.ws_addr '{}'", config.server.ws_addr))?;
        let ws = Arc::new(
            WsServer::new(addr, broadcaster.clone(), Arc::clone(&tracking))
                .with_greeting(config.server.greeting.clone()),
        );

        Ok(Self {
            engine: Arc::new(engine),
            broadcaster,
            tracking,
            ws,
        })
    }
}

fn open_store(storage: &StorageConfig) -> Result<Arc<dyn FleetStore>> {
    match storage {
        StorageConfig::Memory => {
            info!("Using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageConfig::Sqlite { path } => {
            info!(path = %path, "Opening SQLite store");
            let store = SqliteStore::open(path)
                .with_context(|| format!("failed to open SQLite store at {}", path))?;
            Ok(Arc::new(store))
        }
    }
}
