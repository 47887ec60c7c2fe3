//! Identity resolution seam and the pending-retry record.

use async_trait::async_trait;
use beacon_model::{ServiceRef, TargetNode};
use thiserror::Error;

/// A transient identity-resolution failure.
///
/// Never surfaced to the caller of `update`: the affected target is still
/// accepted into the tree and scheduled for background retry.
#[derive(Debug, Error)]
#[error("identity resolution failed for {uri}: {reason}")]
pub struct ResolveError {
    /// Connect URI of the target that failed to resolve.
    pub uri: String,
    /// Human-readable failure reason.
    pub reason: String,
}

impl ResolveError {
    /// Creates a resolution error for the given target URI.
    pub fn new(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        ResolveError {
            uri: uri.into(),
            reason: reason.into(),
        }
    }
}

/// Output of a successful identity resolution.
///
/// The stable id plus whatever runtime metadata the resolver observed while
/// attached; the registry records the metadata as annotations on the target.
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    /// The stable identity ("jvmId").
    pub jvm_id: String,

    /// Main class of the running JVM, when observed.
    pub java_main: Option<String>,

    /// JVM start time, when observed.
    pub start_time: Option<String>,
}

impl ResolvedIdentity {
    /// Creates an identity with no runtime metadata.
    pub fn new(jvm_id: impl Into<String>) -> Self {
        ResolvedIdentity {
            jvm_id: jvm_id.into(),
            java_main: None,
            start_time: None,
        }
    }

    /// Builder-style main-class setter.
    #[must_use]
    pub fn with_java_main(mut self, java_main: impl Into<String>) -> Self {
        self.java_main = Some(java_main.into());
        self
    }

    /// Builder-style start-time setter.
    #[must_use]
    pub fn with_start_time(mut self, start_time: impl Into<String>) -> Self {
        self.start_time = Some(start_time.into());
        self
    }
}

/// Resolves a stable identity ("jvmId") for a raw target reference.
///
/// External collaborator: the production implementation attaches to the
/// target JVM and reads its identity, which can fail transiently (target
/// still starting, credentials not yet supplied). The retry orchestration
/// lives in the registry, not here.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Attempts to resolve the identity of `target`.
    ///
    /// `allow_stored_credentials` permits the resolver to consult the
    /// credential store when the target requires authentication.
    async fn resolve(
        &self,
        target: &ServiceRef,
        allow_stored_credentials: bool,
    ) -> std::result::Result<ResolvedIdentity, ResolveError>;
}

/// One target awaiting identity resolution.
///
/// Keyed by owning plugin id and connect URI. The pending set is in-memory
/// only: a process restart forgets in-flight retries, and the next plugin
/// update re-enqueues anything still unresolved.
#[derive(Debug, Clone)]
pub struct PendingResolution {
    /// Id of the plugin whose subtree contains the target.
    pub plugin_id: String,

    /// The unresolved target node as last submitted.
    pub node: TargetNode,
}

impl PendingResolution {
    /// True if this entry refers to the same target of the same plugin.
    pub fn same_entry(&self, plugin_id: &str, connect_uri: &str) -> bool {
        self.plugin_id == plugin_id && self.node.target.connect_uri == connect_uri
    }
}
