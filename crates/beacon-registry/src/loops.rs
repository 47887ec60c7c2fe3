//! Background maintenance loops.
//!
//! Two independent periodic loops run against the registry:
//!
//! * **Prune** — probes every external plugin's callback and deregisters the
//!   unresponsive ones, firing the same `LOST` events as an explicit
//!   deregistration.
//! * **Retry** — re-attempts identity resolution for targets in the pending
//!   set, without backoff and without giving up; an unresolvable target
//!   stays pending until it resolves or its plugin goes away.
//!
//! Both loops skip their first immediate tick so a freshly started registry
//! does not prune plugins that have had no chance to answer yet.

use crate::registry::DiscoveryRegistry;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

/// Handles to the spawned maintenance loops.
///
/// Aborted on [`RegistryLoops::shutdown`] or drop; the loops hold their own
/// `Arc` to the registry, so dropping this without shutdown would otherwise
/// leak them for the lifetime of the runtime.
pub struct RegistryLoops {
    prune: JoinHandle<()>,
    retry: JoinHandle<()>,
}

impl RegistryLoops {
    /// Stops both loops and waits for them to terminate.
    ///
    /// Awaiting the aborted tasks ensures their registry handles (and with
    /// them the store's file lock) are released before this returns, so the
    /// database can be reopened immediately afterwards.
    pub async fn shutdown(mut self) {
        self.prune.abort();
        self.retry.abort();
        let _ = (&mut self.prune).await;
        let _ = (&mut self.retry).await;
        info!("registry maintenance loops stopped");
    }
}

impl Drop for RegistryLoops {
    fn drop(&mut self) {
        self.prune.abort();
        self.retry.abort();
    }
}

impl DiscoveryRegistry {
    /// Spawns the prune and retry loops onto the current runtime. The loops
    /// keep their own handle to the registry.
    pub fn spawn_loops(self: Arc<Self>) -> RegistryLoops {
        let prune = {
            let registry = Arc::clone(&self);
            let period = registry.settings.prune_period;
            tokio::spawn(async move {
                let mut ticks = interval_at(Instant::now() + period, period);
                loop {
                    ticks.tick().await;
                    registry.prune_tick().await;
                }
            })
        };

        let retry = {
            let registry = Arc::clone(&self);
            let period = registry.settings.retry_period;
            tokio::spawn(async move {
                let mut ticks = interval_at(Instant::now() + period, period);
                loop {
                    ticks.tick().await;
                    registry.retry_tick().await;
                }
            })
        };

        info!(
            prune_period = ?self.settings.prune_period,
            retry_period = ?self.settings.retry_period,
            "registry maintenance loops started"
        );
        RegistryLoops { prune, retry }
    }

    /// One pass of the liveness-prune loop.
    ///
    /// Pings run as separate tasks so a panicking or slow probe is isolated
    /// from the rest of the sweep; a probe task that dies counts as a failed
    /// probe. Built-in plugins have no callback and are never pruned.
    pub async fn prune_tick(&self) {
        let plugins = match self.store.get_all() {
            Ok(plugins) => plugins,
            Err(error) => {
                warn!(%error, "prune pass skipped, store read failed");
                return;
            }
        };

        let grace = self.settings.registration_grace.as_secs();
        let now = now_unix();

        let mut probes = Vec::new();
        for info in plugins {
            if info.is_builtin() {
                continue;
            }
            if now.saturating_sub(info.registered_at) < grace {
                debug!(id = %info.id, "skipping probe, registration within grace period");
                continue;
            }
            let prober = Arc::clone(&self.prober);
            let callback = info.callback.clone();
            probes.push((
                info.id,
                tokio::spawn(async move { prober.ping(callback.as_deref()).await }),
            ));
        }

        for (id, probe) in probes {
            let alive = probe.await.unwrap_or(false);
            if alive {
                continue;
            }
            warn!(id, "plugin failed liveness probe, pruning");
            if let Err(error) = self.deregister(&id).await {
                // Concurrent deregistration races are benign.
                debug!(id, %error, "prune deregistration skipped");
            }
        }
    }

    /// One pass of the identity-resolution retry loop.
    ///
    /// Probes every pending target; plugins with at least one newly
    /// resolvable target get their stored subtree resubmitted through the
    /// regular update path, which persists the resolved identity and fires
    /// `MODIFIED` for the changed leaf.
    pub async fn retry_tick(&self) {
        let pending = { self.state.lock().await.pending.clone() };
        if pending.is_empty() {
            return;
        }
        debug!(count = pending.len(), "retrying pending identity resolutions");

        let mut resolvable = BTreeSet::new();
        for entry in &pending {
            if self.resolver.resolve(&entry.node.target, true).await.is_ok() {
                resolvable.insert(entry.plugin_id.clone());
            }
        }

        for plugin_id in resolvable {
            self.resubmit(&plugin_id).await;
        }
    }

    /// Reacts to newly supplied credentials.
    ///
    /// Pending targets matching `expression` are retried immediately instead
    /// of waiting for the next retry tick. Evaluation errors fail open to a
    /// non-match.
    pub async fn credentials_added(&self, expression: &str) {
        let pending = { self.state.lock().await.pending.clone() };

        let mut affected = BTreeSet::new();
        for entry in &pending {
            match self.matcher.matches(expression, &entry.node.target) {
                Ok(true) => {
                    affected.insert(entry.plugin_id.clone());
                }
                Ok(false) => {}
                Err(error) => {
                    warn!(expression, %error, "match evaluation failed");
                }
            }
        }

        for plugin_id in affected {
            info!(plugin_id, "credentials added, retrying pending resolutions");
            self.resubmit(&plugin_id).await;
        }
    }

    /// Replays a plugin's stored subtree through the update path.
    ///
    /// A plugin deregistered in the meantime simply has its pending entries
    /// dropped.
    async fn resubmit(&self, plugin_id: &str) {
        let info = match self.store.get(plugin_id) {
            Ok(Some(info)) => info,
            Ok(None) => {
                let mut state = self.state.lock().await;
                state.pending.retain(|p| p.plugin_id != plugin_id);
                return;
            }
            Err(error) => {
                warn!(plugin_id, %error, "resubmission skipped, store read failed");
                return;
            }
        };

        if let Err(error) = self.update(plugin_id, info.subtree.children).await {
            warn!(plugin_id, %error, "resubmission failed");
        }
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
