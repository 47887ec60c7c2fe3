//! Error types for the discovery registry.
//!
//! Only three failures are caller-visible: a failed registration probe, a
//! reference to an unknown plugin id, and a malformed submitted tree.
//! Transient resolution and probe failures are absorbed into the background
//! retry and prune loops and observable only through logs and side effects.

use beacon_store::StoreError;
use thiserror::Error;

/// Errors surfaced by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The liveness probe of the supplied callback failed during `register`.
    /// Not retried automatically; the caller must re-attempt.
    #[error("registration failed: liveness probe of {callback} did not succeed")]
    RegistrationFailed {
        /// The callback address that was probed.
        callback: String,
    },

    /// The operation referenced an unknown plugin id.
    #[error("plugin not found: {0}")]
    NotFound(String),

    /// The submitted tree is malformed. Rejected before any mutation; the
    /// store is left untouched.
    #[error("invalid discovery tree: {0}")]
    InvalidTree(String),

    /// Store failure passthrough.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The HTTP liveness prober could not be constructed.
    #[error("liveness prober initialization failed: {0}")]
    ProberInit(#[from] reqwest::Error),
}
