//! The discovery registry state machine.
//!
//! Per-plugin registrations move through `Registering → Active → (Pruned |
//! Deregistered)`. There is no `Active → Registering` transition:
//! re-registration with a previously issued id is a validation check handled
//! by [`DiscoveryRegistry::validate_renewal`], not a state change.

use crate::credentials::{CredentialStore, NoCredentials};
use crate::diff::diff_leaves;
use crate::error::RegistryError;
use crate::events::{DiscoveryEvent, EventKind, NotificationPublisher, DISCOVERY_CATEGORY};
use crate::matcher::{MatchEvaluator, UriMatcher};
use crate::probe::{credential_reference, HttpProber, LivenessProber};
use crate::resolve::{IdentityResolver, PendingResolution};
use crate::Result;
use beacon_model::{
    find_leaves, AnnotationKey, EnvironmentNode, Node, NodeType, ServiceRef, TargetNode,
    REALM_LABEL,
};
use beacon_store::{PluginInfo, PluginStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Tunable parameters of the registry's control loops.
///
/// The prune and retry periods deliberately default to different cadences;
/// nothing may assume their ticks interleave in any particular order.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Period of the liveness-prune loop.
    pub prune_period: Duration,

    /// Period of the identity-resolution retry loop.
    pub retry_period: Duration,

    /// Per-request timeout of the HTTP liveness prober.
    pub ping_timeout: Duration,

    /// Registrations younger than this are exempt from pruning. Zero (the
    /// default) disables the grace period, preserving upstream behavior;
    /// deployments whose plugins heartbeat slower than the prune period
    /// should raise it.
    pub registration_grace: Duration,
}

impl RegistrySettings {
    /// Creates settings with default values.
    ///
    /// Defaults: prune every 60s, retry every 15s, 500ms ping timeout,
    /// no registration grace period.
    #[must_use]
    pub fn new() -> Self {
        RegistrySettings {
            prune_period: Duration::from_secs(60),
            retry_period: Duration::from_secs(15),
            ping_timeout: Duration::from_millis(500),
            registration_grace: Duration::ZERO,
        }
    }

    /// Sets the prune period.
    #[must_use]
    pub fn with_prune_period(mut self, period: Duration) -> Self {
        self.prune_period = period;
        self
    }

    /// Sets the retry period.
    #[must_use]
    pub fn with_retry_period(mut self, period: Duration) -> Self {
        self.retry_period = period;
        self
    }

    /// Sets the liveness ping timeout.
    #[must_use]
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Sets the registration grace period.
    #[must_use]
    pub fn with_registration_grace(mut self, grace: Duration) -> Self {
        self.registration_grace = grace;
        self
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self::new()
    }
}

/// Coordinator-owned mutable state.
///
/// The pending set is never touched by background workers directly; they
/// only return results for the coordinator to apply.
pub(crate) struct CoordinatorState {
    /// Targets awaiting identity resolution, keyed by (plugin id, URI).
    pub(crate) pending: Vec<PendingResolution>,
}

impl CoordinatorState {
    fn upsert_pending(&mut self, entry: PendingResolution) {
        self.pending
            .retain(|p| !p.same_entry(&entry.plugin_id, &entry.node.target.connect_uri));
        self.pending.push(entry);
    }
}

/// Builder for [`DiscoveryRegistry`].
pub struct RegistryBuilder {
    store: PluginStore,
    resolver: Arc<dyn IdentityResolver>,
    publisher: Arc<dyn NotificationPublisher>,
    settings: RegistrySettings,
    credentials: Arc<dyn CredentialStore>,
    matcher: Arc<dyn MatchEvaluator>,
    prober: Option<Arc<dyn LivenessProber>>,
}

impl RegistryBuilder {
    /// Sets the control-loop settings.
    #[must_use]
    pub fn with_settings(mut self, settings: RegistrySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the credential store collaborator.
    #[must_use]
    pub fn with_credential_store(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Sets the match evaluator collaborator.
    #[must_use]
    pub fn with_match_evaluator(mut self, matcher: Arc<dyn MatchEvaluator>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Replaces the liveness prober. When unset, an [`HttpProber`] is built
    /// from the settings and credential store.
    #[must_use]
    pub fn with_prober(mut self, prober: Arc<dyn LivenessProber>) -> Self {
        self.prober = Some(prober);
        self
    }

    /// Builds the registry.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::ProberInit` if the default HTTP prober cannot
    /// be constructed.
    pub fn build(self) -> Result<DiscoveryRegistry> {
        let prober = match self.prober {
            Some(prober) => prober,
            None => Arc::new(HttpProber::new(
                self.settings.ping_timeout,
                Arc::clone(&self.credentials),
            )?),
        };

        Ok(DiscoveryRegistry {
            store: self.store,
            resolver: self.resolver,
            publisher: self.publisher,
            credentials: self.credentials,
            matcher: self.matcher,
            prober,
            settings: self.settings,
            state: Mutex::new(CoordinatorState {
                pending: Vec::new(),
            }),
        })
    }
}

/// The discovery registry.
///
/// Owns the merged tree view, implements register/update/deregister, and
/// derives change events from structural diffs. Background loops are spawned
/// separately via [`DiscoveryRegistry::spawn_loops`](crate::RegistryLoops).
///
/// # Concurrency
///
/// Every structural mutation is serialized through one internal mutex: the
/// diff source read and the subtree write are a single atomic step, so lost
/// updates are impossible. Identity resolution and liveness pings are
/// awaited before the mutex is taken; no I/O happens while it is held.
pub struct DiscoveryRegistry {
    pub(crate) store: PluginStore,
    pub(crate) resolver: Arc<dyn IdentityResolver>,
    pub(crate) publisher: Arc<dyn NotificationPublisher>,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) matcher: Arc<dyn MatchEvaluator>,
    pub(crate) prober: Arc<dyn LivenessProber>,
    pub(crate) settings: RegistrySettings,
    pub(crate) state: Mutex<CoordinatorState>,
}

impl DiscoveryRegistry {
    /// Starts building a registry over the given store and collaborators.
    pub fn builder(
        store: PluginStore,
        resolver: Arc<dyn IdentityResolver>,
        publisher: Arc<dyn NotificationPublisher>,
    ) -> RegistryBuilder {
        RegistryBuilder {
            store,
            resolver,
            publisher,
            settings: RegistrySettings::default(),
            credentials: Arc::new(NoCredentials),
            matcher: Arc::new(UriMatcher),
            prober: None,
        }
    }

    /// Registers a new plugin and returns its server-issued id.
    ///
    /// A non-null callback is probed once, synchronously, before anything is
    /// persisted; a failed probe aborts registration. The stored subtree
    /// root is stamped with `REALM=<id>` so every node under the realm can
    /// be traced back to its registration.
    ///
    /// Concurrent double-registration of the same realm is allowed at this
    /// layer; callers needing idempotency validate a previously issued id
    /// via [`DiscoveryRegistry::validate_renewal`].
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::RegistrationFailed` if the callback probe
    /// does not succeed.
    pub async fn register(&self, realm: &str, callback: Option<String>) -> Result<String> {
        if let Some(cb) = &callback {
            if !self.prober.ping(Some(cb)).await {
                return Err(RegistryError::RegistrationFailed {
                    callback: cb.clone(),
                });
            }
        }

        let _coordinator = self.state.lock().await;

        let root = EnvironmentNode::new(realm, NodeType::realm());
        let info = self.store.save(realm, callback, root)?;

        let mut subtree = info.subtree;
        subtree
            .labels
            .insert(REALM_LABEL.to_string(), info.id.clone());
        self.store.update_subtree(&info.id, subtree)?;

        info!(realm, id = %info.id, "registered discovery plugin");
        Ok(info.id)
    }

    /// Replaces a plugin's subtree children and publishes the derived
    /// change events.
    ///
    /// Identity resolution runs first, outside the coordinator lock; a
    /// target that fails to resolve is still included in the tree
    /// (visibility is not gated on resolution) and queued for background
    /// retry. The previous subtree is then read, the new children
    /// persisted, and the two leaf sets diffed in one serialized step.
    /// Events fire in MODIFIED → FOUND → LOST order.
    ///
    /// Returns the children as persisted (submitted ids discarded,
    /// annotations stamped). Node ids are assigned at read time by
    /// [`DiscoveryRegistry::discovery_tree`], never trusted from input.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` for an unknown id and
    /// `RegistryError::InvalidTree` for a malformed submission; in both
    /// cases the store is untouched.
    pub async fn update(&self, id: &str, mut children: Vec<Node>) -> Result<Vec<Node>> {
        validate_children(&children)?;
        for child in &mut children {
            clear_ids(child);
        }

        let realm = self
            .store
            .get(id)?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?
            .realm;

        // Resolution I/O happens before the coordinator lock is taken.
        let unresolved = self.resolve_children(id, &realm, &mut children).await;

        let mut state = self.state.lock().await;

        let previous = self
            .store
            .get(id)?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        let updated = match self.store.update_subtree_children(id, children) {
            Ok(info) => info,
            Err(StoreError::NotFound(_)) => return Err(RegistryError::NotFound(id.to_string())),
            Err(e) => return Err(e.into()),
        };

        // The new submission supersedes any retries queued for this plugin.
        state.pending.retain(|p| p.plugin_id != id);
        for entry in unresolved {
            state.upsert_pending(entry);
        }

        let old_leaves = subtree_leaves(&previous.subtree);
        let new_leaves = subtree_leaves(&updated.subtree);
        let diff = diff_leaves(&old_leaves, &new_leaves);

        debug!(
            id,
            realm,
            added = diff.added.len(),
            removed = diff.removed.len(),
            updated = diff.updated.len(),
            "applied subtree update"
        );

        self.publish_all(EventKind::Modified, diff.updated);
        self.publish_all(EventKind::Found, diff.added);
        self.publish_all(EventKind::Lost, diff.removed);

        Ok(updated.subtree.children)
    }

    /// Deregisters a plugin, returning its final record.
    ///
    /// Releases any stored credentials referenced by the callback address,
    /// deletes the row, and publishes `LOST` for every leaf of the
    /// last-known subtree.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` for an unknown id.
    pub async fn deregister(&self, id: &str) -> Result<PluginInfo> {
        let mut state = self.state.lock().await;

        let info = self
            .store
            .get(id)?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        if let Some(cb) = &info.callback {
            if let Some(reference) = credential_reference(cb) {
                self.credentials.release(&reference);
            }
        }

        self.store.delete(id)?;
        state.pending.retain(|p| p.plugin_id != id);

        let leaves = subtree_leaves(&info.subtree);
        self.publish_all(EventKind::Lost, leaves);

        info!(realm = %info.realm, id, "deregistered discovery plugin");
        Ok(info)
    }

    /// Synthesizes the merged discovery tree.
    ///
    /// A non-persisted "Universe" root whose children are every plugin's
    /// current subtree, sorted by name at every level, with node ids
    /// assigned depth-first. Rebuilt on every call; never stored.
    pub fn discovery_tree(&self) -> Result<EnvironmentNode> {
        let mut universe = EnvironmentNode::new("Universe", NodeType::universe());
        for plugin in self.store.get_all()? {
            universe.children.push(Node::Environment(plugin.subtree));
        }
        universe.sort_recursive();

        let mut next_id = 0;
        assign_ids(&mut universe, &mut next_id);
        Ok(universe)
    }

    /// Leaves of the whole merged tree, in deterministic tree order.
    pub fn list_services(&self) -> Result<Vec<ServiceRef>> {
        let tree = self.discovery_tree()?;
        Ok(subtree_leaves(&tree))
    }

    /// Leaves of one plugin's subtree only.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` for an unknown id.
    pub fn list_services_of(&self, id: &str) -> Result<Vec<ServiceRef>> {
        let info = self
            .store
            .get(id)?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        Ok(subtree_leaves(&info.subtree))
    }

    /// Loads a registration record by id.
    pub fn get_by_id(&self, id: &str) -> Result<Option<PluginInfo>> {
        Ok(self.store.get(id)?)
    }

    /// Loads every registration record.
    pub fn plugins(&self) -> Result<Vec<PluginInfo>> {
        Ok(self.store.get_all()?)
    }

    /// Flushes the backing store to disk.
    pub fn flush(&self) -> Result<usize> {
        Ok(self.store.flush()?)
    }

    /// Finds a built-in (no-callback) registration for a realm.
    ///
    /// Duplicate realm lookups return the most relevant record: the
    /// built-in one.
    pub fn get_builtin_by_realm(&self, realm: &str) -> Result<Option<PluginInfo>> {
        Ok(self
            .store
            .get_by_realm(realm)?
            .into_iter()
            .find(PluginInfo::is_builtin))
    }

    /// Confirms that a previously issued id matches `(realm, callback)`.
    ///
    /// Used by the gateway's re-registration path: a renewal presents its
    /// prior id and must not silently mint a second registration for a
    /// different realm or callback.
    pub fn validate_renewal(
        &self,
        id: &str,
        realm: &str,
        callback: Option<&str>,
    ) -> Result<bool> {
        Ok(self
            .store
            .get(id)?
            .map_or(false, |info| {
                info.realm == realm && info.callback.as_deref() == callback
            }))
    }

    /// Number of targets currently awaiting identity resolution.
    pub async fn pending_resolutions(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Walks `children`, stamping registry annotations on every target and
    /// resolving identities for the unresolved ones. Failures are collected
    /// for the pending set, never propagated: visibility is not gated on
    /// resolution.
    async fn resolve_children(
        &self,
        plugin_id: &str,
        realm: &str,
        children: &mut [Node],
    ) -> Vec<PendingResolution> {
        let mut targets = Vec::new();
        for child in children.iter_mut() {
            collect_targets_mut(child, &mut targets);
        }

        let mut unresolved = Vec::new();
        for node in targets {
            annotate(&mut node.target, realm);

            if node.target.jvm_id.is_some() {
                continue;
            }
            match self.resolver.resolve(&node.target, true).await {
                Ok(identity) => {
                    node.target.jvm_id = Some(identity.jvm_id);
                    if let Some(main) = identity.java_main {
                        node.target
                            .registry_annotations
                            .insert(AnnotationKey::JavaMain, main);
                    }
                    if let Some(start) = identity.start_time {
                        node.target
                            .registry_annotations
                            .insert(AnnotationKey::StartTime, start);
                    }
                }
                Err(error) => {
                    debug!(uri = %node.target.connect_uri, %error, "identity unresolved, queuing retry");
                    unresolved.push(PendingResolution {
                        plugin_id: plugin_id.to_string(),
                        node: node.clone(),
                    });
                }
            }
        }
        unresolved
    }

    pub(crate) fn publish_all(&self, kind: EventKind, refs: Vec<ServiceRef>) {
        for service_ref in refs {
            self.publisher
                .publish(DISCOVERY_CATEGORY, DiscoveryEvent { kind, service_ref });
        }
    }
}

impl std::fmt::Debug for DiscoveryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryRegistry")
            .field("plugin_count", &self.store.len())
            .finish()
    }
}

/// Stamps the registry-maintained annotations onto one target.
fn annotate(target: &mut ServiceRef, realm: &str) {
    target
        .registry_annotations
        .insert(AnnotationKey::Realm, realm.to_string());

    if let Ok(url) = reqwest::Url::parse(&target.connect_uri) {
        if let Some(host) = url.host_str() {
            target
                .registry_annotations
                .insert(AnnotationKey::Host, host.to_string());
        }
        if let Some(port) = url.port() {
            target
                .registry_annotations
                .insert(AnnotationKey::Port, port.to_string());
        }
    }
}

/// Rejects malformed submissions before any mutation.
fn validate_children(children: &[Node]) -> Result<()> {
    for child in children {
        match child {
            Node::Environment(env) => {
                if env.name.is_empty() {
                    return Err(RegistryError::InvalidTree(
                        "environment node with empty name".to_string(),
                    ));
                }
                validate_children(&env.children)?;
            }
            Node::Target(t) => {
                if t.target.connect_uri.is_empty() {
                    return Err(RegistryError::InvalidTree(
                        "target node with empty connect URI".to_string(),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Flattens a subtree to its leaf `ServiceRef`s.
fn subtree_leaves(subtree: &EnvironmentNode) -> Vec<ServiceRef> {
    subtree
        .children
        .iter()
        .flat_map(find_leaves)
        .map(|t| t.target.clone())
        .collect()
}

/// Discards submitted node ids recursively.
fn clear_ids(node: &mut Node) {
    match node {
        Node::Target(t) => t.id = None,
        Node::Environment(env) => {
            env.id = None;
            for child in &mut env.children {
                clear_ids(child);
            }
        }
    }
}

/// Collects mutable references to every target node in a subtree.
fn collect_targets_mut<'a>(node: &'a mut Node, out: &mut Vec<&'a mut TargetNode>) {
    match node {
        Node::Target(t) => out.push(t),
        Node::Environment(env) => {
            for child in &mut env.children {
                collect_targets_mut(child, out);
            }
        }
    }
}

/// Assigns read-time ids depth-first. Input ids are never trusted; every
/// read recomputes them from scratch.
fn assign_ids(env: &mut EnvironmentNode, next: &mut u64) {
    env.id = Some(*next);
    *next += 1;
    for child in &mut env.children {
        match child {
            Node::Environment(e) => assign_ids(e, next),
            Node::Target(t) => {
                t.id = Some(*next);
                *next += 1;
            }
        }
    }
}
