//! Built-in platform probes and their bootstrapper.
//!
//! Built-in discovery (local process scanning, Kubernetes API watches, ...)
//! runs in-process and registers through the same registry path as external
//! plugins, just without a callback address. The bootstrapper reconciles the
//! stored built-in registrations with the probes configured for this run,
//! starts each probe, and forwards its update stream into the registry.

use crate::error::BeaconError;
use async_trait::async_trait;
use beacon_model::Node;
use beacon_registry::DiscoveryRegistry;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A built-in platform probe failure.
#[derive(Debug, Error)]
#[error("platform probe '{realm}' failed: {reason}")]
pub struct ProbeError {
    /// Realm of the failing probe.
    pub realm: String,
    /// Human-readable failure reason.
    pub reason: String,
}

impl ProbeError {
    /// Creates a probe error for the given realm.
    pub fn new(realm: impl Into<String>, reason: impl Into<String>) -> Self {
        ProbeError {
            realm: realm.into(),
            reason: reason.into(),
        }
    }
}

/// One built-in discovery mechanism.
///
/// A probe owns the platform-specific watching (processes, pods, cloud
/// instances) and reports plain subtree children; everything else, including
/// identity resolution and event derivation, happens in the registry.
#[async_trait]
pub trait PlatformProbe: Send + Sync {
    /// The realm this probe discovers for, e.g. `"LocalRealm"`.
    fn realm(&self) -> &str;

    /// Starts platform watching.
    async fn start(&self) -> std::result::Result<(), ProbeError>;

    /// Stops platform watching.
    async fn stop(&self) -> std::result::Result<(), ProbeError>;

    /// One-shot snapshot of the currently discoverable targets, pushed as
    /// the realm's first subtree right after start.
    async fn initial_children(&self) -> std::result::Result<Vec<Node>, ProbeError>;

    /// Subscribes to subsequent full-snapshot updates.
    fn updates(&self) -> broadcast::Receiver<Vec<Node>>;
}

/// Reconciles and runs the built-in probes.
///
/// Probe failures are isolated: one probe that fails to start or snapshot is
/// logged and skipped, the rest of the fleet still comes up.
pub struct BuiltInBootstrapper {
    registry: Arc<DiscoveryRegistry>,
    probes: Vec<Arc<dyn PlatformProbe>>,
    forwarders: Mutex<Vec<JoinHandle<()>>>,
}

impl BuiltInBootstrapper {
    /// Creates a bootstrapper with no probes.
    pub fn new(registry: Arc<DiscoveryRegistry>) -> Self {
        BuiltInBootstrapper {
            registry,
            probes: Vec::new(),
            forwarders: Mutex::new(Vec::new()),
        }
    }

    /// Adds a probe to run on start.
    pub fn add_probe(&mut self, probe: Arc<dyn PlatformProbe>) {
        self.probes.push(probe);
    }

    /// Realms of the configured probes.
    pub fn realms(&self) -> Vec<&str> {
        self.probes.iter().map(|p| p.realm()).collect()
    }

    /// Starts all probes.
    ///
    /// First deregisters built-in registrations left over from a previous
    /// run whose realm is no longer configured, so their subtrees do not
    /// linger in the merged tree forever (built-ins are exempt from
    /// pruning). Then, per probe: find or create the built-in registration,
    /// start the probe, push its initial snapshot, and spawn a forwarder
    /// for its update stream.
    pub async fn start(&self) -> std::result::Result<(), BeaconError> {
        let selected: HashSet<&str> = self.probes.iter().map(|p| p.realm()).collect();
        for info in self.registry.plugins()? {
            if info.is_builtin() && !selected.contains(info.realm.as_str()) {
                info!(realm = %info.realm, "removing stale built-in registration");
                if let Err(error) = self.registry.deregister(&info.id).await {
                    warn!(id = %info.id, %error, "stale built-in cleanup failed");
                }
            }
        }

        for probe in &self.probes {
            let realm = probe.realm();
            let id = match self.registry.get_builtin_by_realm(realm)? {
                Some(info) => {
                    debug!(realm, id = %info.id, "reusing built-in registration");
                    info.id
                }
                None => self.registry.register(realm, None).await?,
            };

            if let Err(error) = probe.start().await {
                warn!(realm, %error, "built-in probe failed to start, skipping");
                continue;
            }

            match probe.initial_children().await {
                Ok(children) => {
                    if let Err(error) = self.registry.update(&id, children).await {
                        warn!(realm, %error, "initial snapshot rejected");
                    }
                }
                Err(error) => {
                    warn!(realm, %error, "initial snapshot unavailable");
                }
            }

            self.spawn_forwarder(probe, &id);
            info!(realm, id, "built-in probe started");
        }

        Ok(())
    }

    /// Stops every probe and its forwarder. Stop failures are isolated per
    /// probe.
    ///
    /// Forwarder tasks are awaited after abort so their registry handles are
    /// released before this returns.
    pub async fn shutdown(&self) {
        let forwarders = {
            let mut guard = self.forwarders.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *guard)
        };
        for task in &forwarders {
            task.abort();
        }
        for task in forwarders {
            let _ = task.await;
        }

        for probe in &self.probes {
            if let Err(error) = probe.stop().await {
                warn!(realm = probe.realm(), %error, "built-in probe failed to stop");
            }
        }
        info!("built-in probes stopped");
    }

    /// Spawns the task that pipes one probe's update stream into the
    /// registry. The task ends when the probe drops its broadcast sender.
    fn spawn_forwarder(&self, probe: &Arc<dyn PlatformProbe>, id: &str) {
        let mut updates = probe.updates();
        let registry = Arc::clone(&self.registry);
        let plugin_id = id.to_string();
        let realm = probe.realm().to_string();

        let task = tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(children) => {
                        if let Err(error) = registry.update(&plugin_id, children).await {
                            warn!(realm, %error, "probe update rejected");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Snapshots are full replacements; skipping stale
                        // ones is harmless.
                        debug!(realm, missed, "probe updates lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.forwarders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(task);
    }
}
