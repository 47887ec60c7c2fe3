//! # Beacon Core
//!
//! Unified facade for the Beacon discovery platform.
//! Orchestrates the plugin store, discovery registry, built-in platform
//! probes, and the background maintenance loops.
//!
//! ## Discovery Sources
//!
//! | Source | Mechanism | Registration |
//! |--------|-----------|--------------|
//! | Built-in probes | In-process platform watching | No callback, prune-exempt |
//! | External plugins | Gateway register/update/deregister | Callback, health-checked |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         BEACON CORE                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │                    ┌─────────────────┐                          │
//! │                    │     Beacon      │  ← Unified Facade        │
//! │                    │      Core       │                          │
//! │                    └────────┬────────┘                          │
//! │                             │                                   │
//! │         ┌───────────────────┼───────────────────┐               │
//! │         ▼                   ▼                   ▼               │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐          │
//! │  │  Discovery  │    │  Built-in   │    │ Maintenance │          │
//! │  │  Registry   │    │ Bootstrapper│    │    Loops    │          │
//! │  └──────┬──────┘    └─────────────┘    └─────────────┘          │
//! │         ▼                                                       │
//! │  ┌─────────────┐                                                │
//! │  │ PluginStore │  (sled)                                        │
//! │  └─────────────┘                                                │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use beacon_core::{Beacon, BeaconConfig};
//!
//! let mut beacon = Beacon::new(BeaconConfig::default(), resolver)?;
//! beacon.register_probe(Arc::new(LocalProbe::new()));
//!
//! let mut events = beacon.take_events().unwrap();
//! beacon.start().await?;
//!
//! while let Some((category, event)) = events.recv().await {
//!     route(category, event);
//! }
//! ```

mod beacon;
mod bootstrap;
mod config;
mod error;

pub use beacon::Beacon;
pub use bootstrap::{BuiltInBootstrapper, PlatformProbe, ProbeError};
pub use config::{BeaconConfig, LoopConfig, PlatformConfig, StoreConfig};
pub use error::BeaconError;

// Re-export component types for convenience
pub use beacon_model::{
    find_leaves, AnnotationKey, EnvironmentNode, Node, NodeType, ServiceRef, TargetNode,
    REALM_LABEL,
};
pub use beacon_registry::{
    CredentialStore, Credentials, DiscoveryEvent, DiscoveryRegistry, EventKind, IdentityResolver,
    NotificationPublisher, RegistrySettings, ResolveError, ResolvedIdentity, DISCOVERY_CATEGORY,
};
pub use beacon_store::{PluginInfo, PluginStore};

/// Core result type for Beacon operations.
pub type Result<T> = std::result::Result<T, BeaconError>;
