//! Hub configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{HubError, Result};

/// One gateway to connect to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayEndpoint {
    /// Hostname or IP of the gateway.
    pub host: String,
    /// TCP port the gateway listens on.
    pub port: u16,
}

/// Main hub configuration, loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HubConfig {
    /// Path of the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Initial sampling interval for the local collector, in
    /// milliseconds. The persisted settings value takes precedence once
    /// one exists.
    #[serde(default = "default_sampling_interval_ms")]
    pub sampling_interval_ms: u64,
    /// Fixed delay between gateway reconnect attempts, in seconds.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Gateways to connect to. Empty means local collection only.
    #[serde(default)]
    pub gateways: Vec<GatewayEndpoint>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("timeseries.db")
}

const fn default_sampling_interval_ms() -> u64 {
    5000
}

const fn default_reconnect_delay_secs() -> u64 {
    15
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            sampling_interval_ms: default_sampling_interval_ms(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            gateways: Vec::new(),
        }
    }
}

impl HubConfig {
    /// Loads configuration from a JSON file.
    ///
    /// A missing file is not an error: defaults are used and a warning is
    /// logged, so a fresh install runs without any setup.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| HubError::Config {
            reason: format!("failed to read '{}': {e}", path.display()),
        })?;
        serde_json::from_str(&content).map_err(|e| HubError::Config {
            reason: format!("invalid config '{}': {e}", path.display()),
        })
    }
}
