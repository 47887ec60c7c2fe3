//! Configuration types for the Beacon facade.

use crate::error::BeaconError;
use beacon_registry::RegistrySettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the Beacon discovery platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeaconConfig {
    /// Plugin store configuration.
    pub store: StoreConfig,

    /// Registry and maintenance-loop configuration.
    pub registry: LoopConfig,

    /// Built-in platform probe configuration.
    pub platform: PlatformConfig,
}

impl BeaconConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `BeaconError::Config` when the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| BeaconError::Config(format!("reading {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| BeaconError::Config(format!("parsing {}: {e}", path.display())))
    }
}

/// Plugin store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the plugin registration database.
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./beacon_plugins.db"),
        }
    }
}

/// Registry maintenance-loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Liveness-prune loop period, in seconds.
    pub prune_period_secs: u64,

    /// Identity-resolution retry loop period, in seconds.
    pub retry_period_secs: u64,

    /// Liveness ping timeout, in milliseconds.
    pub ping_timeout_ms: u64,

    /// Prune exemption window for fresh registrations, in seconds.
    /// Zero disables the exemption.
    pub registration_grace_secs: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            prune_period_secs: 60,
            retry_period_secs: 15,
            ping_timeout_ms: 500,
            registration_grace_secs: 0,
        }
    }
}

impl LoopConfig {
    /// Converts into the registry's settings type.
    pub fn settings(&self) -> RegistrySettings {
        RegistrySettings::new()
            .with_prune_period(Duration::from_secs(self.prune_period_secs))
            .with_retry_period(Duration::from_secs(self.retry_period_secs))
            .with_ping_timeout(Duration::from_millis(self.ping_timeout_ms))
            .with_registration_grace(Duration::from_secs(self.registration_grace_secs))
    }
}

/// Built-in platform probe configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Realms whose built-in probes should run. Empty enables every probe
    /// wired into the facade.
    pub enabled_realms: Vec<String>,
}

impl PlatformConfig {
    /// True if a probe for `realm` should run under this configuration.
    pub fn is_enabled(&self, realm: &str) -> bool {
        self.enabled_realms.is_empty() || self.enabled_realms.iter().any(|r| r == realm)
    }
}
