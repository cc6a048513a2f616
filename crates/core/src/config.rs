//! Configuration management for FleetOps.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// WebSocket listen address, e.g. `0.0.0.0:8095`
    pub ws_addr: String,
    /// Text sent in the `ack` frame after a client subscribes
    pub greeting: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Process-local maps; state is lost on restart
    Memory,
    /// SQLite database file
    Sqlite { path: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Similarity at or above which a selfie is auto-verified
    pub high_threshold: f64,
    /// Similarity below which a selfie is auto-rejected
    pub low_threshold: f64,
    /// Drivers enrolled at start-up
    pub drivers: Vec<EnrolledDriver>,
}

/// One `[[verification.drivers]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrolledDriver {
    pub driver_id: String,
    /// Reference photo the matcher compares selfies against
    pub reference_photo: String,
    /// `trusted`, `unrecognized` or `revoked`
    #[serde(default = "default_device_trust")]
    pub device_trust: String,
}

fn default_device_trust() -> String {
    "trusted".to_string()
}

/// Device trust levels accepted in `[[verification.drivers]]`.
pub const DEVICE_TRUST_LEVELS: [&str; 3] = ["trusted", "unrecognized", "revoked"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Ring size of the domain event channel
    pub event_capacity: usize,
    /// Ring size of the position channel
    pub tracking_capacity: usize,
    /// Latest samples older than this are pruned
    pub position_max_age_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Activate shifts as soon as verification and vehicle are both in place
    pub auto_activate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_addr: "127.0.0.1:8095".to_string(),
            greeting: "Connected to FleetOps live feed".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            high_threshold: 85.0,
            low_threshold: 60.0,
            drivers: Vec::new(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            event_capacity: 1024,
            tracking_capacity: 4096,
            position_max_age_secs: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            verification: VerificationConfig::default(),
            broadcast: BroadcastConfig::default(),
            engine: EngineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Reject threshold and capacity combinations the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        let v = &self.verification;
        if !(0.0..=100.0).contains(&v.low_threshold) || !(0.0..=100.0).contains(&v.high_threshold)
        {
            return Err(CoreError::Config(
                "verification thresholds must lie within 0..=100".to_string(),
            ));
        }
        if v.low_threshold > v.high_threshold {
            return Err(CoreError::Config(format!(
                "low_threshold {} exceeds high_threshold {}",
                v.low_threshold, v.high_threshold
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for driver in &v.drivers {
            if driver.driver_id.trim().is_empty() {
                return Err(CoreError::Config("enrolled driver without driver_id".to_string()));
            }
            if !seen.insert(driver.driver_id.as_str()) {
                return Err(CoreError::Config(format!(
                    "driver {} enrolled twice",
                    driver.driver_id
                )));
            }
            if !DEVICE_TRUST_LEVELS.contains(&driver.device_trust.as_str()) {
                return Err(CoreError::Config(format!(
                    "driver {}: unknown device_trust '{}'",
                    driver.driver_id, driver.device_trust
                )));
            }
        }
        if self.broadcast.event_capacity == 0 || self.broadcast.tracking_capacity == 0 {
            return Err(CoreError::Config(
                "broadcast capacities must be non-zero".to_string(),
            ));
        }
        if let StorageConfig::Sqlite { path } = &self.storage {
            if path.trim().is_empty() {
                return Err(CoreError::Config("sqlite path is empty".to_string()));
            }
        }
        Ok(())
    }
}
