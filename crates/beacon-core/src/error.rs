//! Error types for the Beacon facade.

use crate::bootstrap::ProbeError;
use thiserror::Error;

/// Core error type for Beacon operations.
#[derive(Debug, Error)]
pub enum BeaconError {
    /// Registry error passthrough.
    #[error("registry error: {0}")]
    Registry(#[from] beacon_registry::RegistryError),

    /// Store error passthrough.
    #[error("store error: {0}")]
    Store(#[from] beacon_store::StoreError),

    /// A built-in platform probe failed.
    #[error("probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
