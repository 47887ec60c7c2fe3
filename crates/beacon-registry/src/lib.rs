//! # Beacon Discovery Registry
//!
//! The central subsystem of the Beacon observability platform: a live,
//! hierarchical inventory of monitorable JVM targets contributed by
//! independent discovery plugins, kept fresh by background health checks and
//! identity-resolution retries, with change events derived from structural
//! tree diffs.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌────────────────────┐
//!                    │ DiscoveryRegistry  │
//!                    │   (coordinator)    │
//!                    └─────────┬──────────┘
//!                              │
//!          ┌───────────┬───────┴───────┬────────────┐
//!          │           │               │            │
//!          ▼           ▼               ▼            ▼
//!    ┌──────────┐ ┌──────────┐  ┌───────────┐ ┌──────────┐
//!    │  Plugin  │ │   Leaf   │  │ Liveness  │ │ Identity │
//!    │  Store   │ │  Differ  │  │  Prober   │ │ Resolver │
//!    │  (sled)  │ │          │  │ (reqwest) │ │ (trait)  │
//!    └──────────┘ └──────────┘  └───────────┘ └──────────┘
//! ```
//!
//! ## Lifecycle
//!
//! 1. **Register**: a plugin registers its realm (optionally with a callback
//!    address, probed once synchronously) and receives a server-issued id.
//! 2. **Update**: the plugin pushes fresh subtree children; the registry
//!    resolves target identities, persists, diffs against the previous
//!    snapshot, and publishes `MODIFIED`/`FOUND`/`LOST` events.
//! 3. **Prune**: a background loop health-checks every callback-bearing
//!    plugin and deregisters unresponsive ones. Built-ins (no callback) are
//!    exempt.
//! 4. **Retry**: a second, independent loop re-attempts identity resolution
//!    for targets that failed transiently; unresolved targets stay visible
//!    in the tree throughout.
//!
//! ## Concurrency Model
//!
//! One coordinator mutex serializes every structural mutation (register,
//! update, deregister, and the diff-then-publish sequence). Liveness pings
//! and identity resolutions are awaited outside that mutex with bounded
//! timeouts, so a slow network peer never stalls the coordinator or other
//! plugins' operations. The two background loops run on independent timers
//! and feed their results back through the same serialized mutation path.
//!
//! ## Delivery Semantics
//!
//! Discovery events are at-least-once and fire-and-forget. Within one update
//! they are published in MODIFIED → FOUND → LOST order; no global order
//! across concurrent updates of different plugins is promised.

mod credentials;
mod diff;
mod error;
mod events;
mod loops;
mod matcher;
mod probe;
mod registry;
mod resolve;

pub use credentials::{CredentialStore, Credentials, NoCredentials};
pub use diff::{diff_leaves, ServiceDiff};
pub use error::RegistryError;
pub use events::{
    ChannelPublisher, DiscoveryEvent, EventKind, NotificationPublisher, DISCOVERY_CATEGORY,
};
pub use loops::RegistryLoops;
pub use matcher::{MatchError, MatchEvaluator, UriMatcher};
pub use probe::{credential_reference, HttpProber, LivenessProber};
pub use registry::{DiscoveryRegistry, RegistryBuilder, RegistrySettings};
pub use resolve::{IdentityResolver, PendingResolution, ResolveError, ResolvedIdentity};

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests;
