//! The unified Beacon facade.
//!
//! This module provides the main entry point for the Beacon discovery
//! platform. The [`Beacon`] struct wires the plugin store, the discovery
//! registry, the built-in probes, and the maintenance loops into one
//! lifecycle.

use crate::{
    bootstrap::{BuiltInBootstrapper, PlatformProbe},
    config::BeaconConfig,
    Result,
};

use beacon_model::{EnvironmentNode, Node, ServiceRef};
use beacon_registry::{
    ChannelPublisher, DiscoveryEvent, DiscoveryRegistry, IdentityResolver, RegistryLoops,
};
use beacon_store::{PluginInfo, PluginStore};

use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

/// The unified Beacon discovery facade.
///
/// Beacon orchestrates four components:
/// - **Plugin Store**: durable registration records (sled)
/// - **Discovery Registry**: the merged target tree and its change events
/// - **Built-in Bootstrapper**: in-process platform probes
/// - **Maintenance Loops**: liveness pruning and resolution retries
///
/// # Lifecycle
///
/// 1. [`Beacon::new`] opens the store and builds the registry.
/// 2. [`Beacon::register_probe`] wires built-in probes (before start).
/// 3. [`Beacon::start`] spawns the loops and starts the probes.
/// 4. [`Beacon::shutdown`] stops everything and flushes the store.
///
/// External plugins talk to the same registry through the gateway
/// delegators ([`Beacon::register_plugin`] and friends).
///
/// # Example
///
/// ```rust,ignore
/// let mut beacon = Beacon::new(BeaconConfig::default(), resolver)?;
/// beacon.register_probe(Arc::new(LocalProbe::new()));
/// let events = beacon.take_events();
/// beacon.start().await?;
/// ```
pub struct Beacon {
    /// Configuration.
    config: BeaconConfig,

    /// The discovery registry.
    registry: Arc<DiscoveryRegistry>,

    /// Built-in probe orchestration.
    bootstrapper: BuiltInBootstrapper,

    /// Maintenance loop handles, present between start and shutdown.
    loops: Option<RegistryLoops>,

    /// Discovery event stream, present until taken.
    events: Option<UnboundedReceiver<(String, DiscoveryEvent)>>,
}

impl Beacon {
    /// Create a new Beacon with the given configuration and identity
    /// resolver.
    ///
    /// # Errors
    ///
    /// Returns an error if the plugin database cannot be opened or the
    /// registry's HTTP prober cannot be built.
    pub fn new(config: BeaconConfig, resolver: Arc<dyn IdentityResolver>) -> Result<Self> {
        let store = PluginStore::open(&config.store.db_path)?;
        let (publisher, events) = ChannelPublisher::new();

        let registry = Arc::new(
            DiscoveryRegistry::builder(store, resolver, publisher)
                .with_settings(config.registry.settings())
                .build()?,
        );
        let bootstrapper = BuiltInBootstrapper::new(Arc::clone(&registry));

        info!(db_path = %config.store.db_path.display(), "Beacon initialized");

        Ok(Self {
            config,
            registry,
            bootstrapper,
            loops: None,
            events: Some(events),
        })
    }

    /// Wire a built-in platform probe. Must be called before [`Beacon::start`].
    ///
    /// Probes whose realm is not enabled by the platform configuration are
    /// silently skipped.
    pub fn register_probe(&mut self, probe: Arc<dyn PlatformProbe>) {
        if !self.config.platform.is_enabled(probe.realm()) {
            debug!(realm = probe.realm(), "probe disabled by configuration");
            return;
        }
        self.bootstrapper.add_probe(probe);
    }

    /// Take the discovery event stream. Returns `None` on second call.
    pub fn take_events(&mut self) -> Option<UnboundedReceiver<(String, DiscoveryEvent)>> {
        self.events.take()
    }

    /// Start the platform: spawn the maintenance loops and bring up the
    /// built-in probes.
    pub async fn start(&mut self) -> Result<()> {
        if self.loops.is_none() {
            self.loops = Some(Arc::clone(&self.registry).spawn_loops());
        }
        self.bootstrapper.start().await?;
        info!("Beacon started");
        Ok(())
    }

    /// Stop the probes and loops and flush the store.
    pub async fn shutdown(&mut self) {
        self.bootstrapper.shutdown().await;
        if let Some(loops) = self.loops.take() {
            loops.shutdown().await;
        }
        if let Err(error) = self.registry.flush() {
            warn!(%error, "store flush failed during shutdown");
        }
        info!("Beacon stopped");
    }

    // Gateway delegators for external plugins.

    /// Register an external discovery plugin.
    pub async fn register_plugin(&self, realm: &str, callback: Option<String>) -> Result<String> {
        Ok(self.registry.register(realm, callback).await?)
    }

    /// Validate a re-registration against a previously issued id.
    pub fn validate_renewal(
        &self,
        id: &str,
        realm: &str,
        callback: Option<&str>,
    ) -> Result<bool> {
        Ok(self.registry.validate_renewal(id, realm, callback)?)
    }

    /// Replace a plugin's subtree children.
    pub async fn update_plugin(&self, id: &str, children: Vec<Node>) -> Result<Vec<Node>> {
        Ok(self.registry.update(id, children).await?)
    }

    /// Deregister a plugin.
    pub async fn deregister_plugin(&self, id: &str) -> Result<PluginInfo> {
        Ok(self.registry.deregister(id).await?)
    }

    // Read side.

    /// The merged discovery tree.
    pub fn discovery_tree(&self) -> Result<EnvironmentNode> {
        Ok(self.registry.discovery_tree()?)
    }

    /// Every discoverable target across all plugins.
    pub fn list_services(&self) -> Result<Vec<ServiceRef>> {
        Ok(self.registry.list_services()?)
    }

    /// Targets contributed by one plugin.
    pub fn list_services_of(&self, id: &str) -> Result<Vec<ServiceRef>> {
        Ok(self.registry.list_services_of(id)?)
    }

    /// Notify the registry that credentials matching `expression` became
    /// available.
    pub async fn credentials_added(&self, expression: &str) {
        self.registry.credentials_added(expression).await;
    }

    /// Direct access to the registry for callers needing the full API.
    pub fn registry(&self) -> &Arc<DiscoveryRegistry> {
        &self.registry
    }
}
