use anyhow::{bail, Context, Result};
use fleetops_core::{logging, time::now_ms, Config};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

mod state;

use state::NodeState;

const NODE_PROTOCOL_VERSION: u32 = 1;
const NODE_RUNTIME_VERSION: u32 = 1;

/// How often stale positions are swept and stats logged.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct NodeVersionHandshake {
    version: &'static str,
    runtime_version: u32,
    protocol_version: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--version-json") {
        let handshake = NodeVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            runtime_version: NODE_RUNTIME_VERSION,
            protocol_version: NODE_PROTOCOL_VERSION,
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    let config = match parse_config_path(&args)? {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default_config(),
    };
    logging::init_from_config(&config.logging);

    let node = NodeState::build(&config)?;
    info!(
        ws_addr = %node.ws.addr(),
        auto_activate = config.engine.auto_activate,
        "fleetops-node started"
    );

    let tracking = Arc::clone(&node.tracking);
    let broadcaster = node.broadcaster.clone();
    let max_age_ms = config.broadcast.position_max_age_secs * 1_000;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        loop {
            ticker.tick().await;
            let pruned = tracking.prune_stale(max_age_ms, now_ms());
            info!(
                subscribers = broadcaster.subscriber_count(),
                published = broadcaster.published_count(),
                tracked_drivers = tracking.latest_positions().len(),
                pruned,
                "Live feed status"
            );
        }
    });

    tokio::select! {
        result = Arc::clone(&node.ws).run() => {
            if let Err(e) = result {
                error!("Live feed stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!(held_locks = node.engine.locks().held_keys().len(), "Shutting down");
        }
    }

    Ok(())
}

/// `--config <path>`, else `FLEETOPS_CONFIG`, else defaults.
fn parse_config_path(args: &[String]) -> Result<Option<PathBuf>> {
    let mut args_iter = args.iter();
    while let Some(arg) = args_iter.next() {
        if arg == "--config" {
            if let Some(path) = args_iter.next() {
                return Ok(Some(PathBuf::from(path)));
            }
            bail!("--config was provided without a path");
        }
    }

    Ok(std::env::var_os("FLEETOPS_CONFIG").map(PathBuf::from))
}
