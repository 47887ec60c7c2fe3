//! Discovery change events and the notification seam.

use beacon_model::ServiceRef;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Notification category under which discovery events are published.
pub const DISCOVERY_CATEGORY: &str = "TargetDiscovery";

/// The kind of change a discovery event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A target appeared that was not in the previous snapshot.
    Found,
    /// An identity-matched target changed fields between snapshots.
    Modified,
    /// A target from the previous snapshot is gone.
    Lost,
}

/// One discovery change event, derived from diffing a plugin's leaf set
/// before and after an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryEvent {
    /// What happened.
    pub kind: EventKind,

    /// The affected target.
    pub service_ref: ServiceRef,
}

/// Downstream event sink.
///
/// Fire-and-forget, at-least-once: the registry never waits for an
/// acknowledgment and a lost notification is not an error. Implementations
/// must not block the caller.
pub trait NotificationPublisher: Send + Sync {
    /// Publishes one event under the given category.
    fn publish(&self, category: &str, event: DiscoveryEvent);
}

/// Publisher backed by an unbounded channel.
///
/// The default wiring for in-process consumers (the rules engine, tests):
/// events are pushed onto the channel and dropped silently once the receiver
/// is gone, preserving fire-and-forget semantics.
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<(String, DiscoveryEvent)>,
}

impl ChannelPublisher {
    /// Creates a publisher and the receiver that observes its events.
    pub fn new() -> (
        Arc<Self>,
        mpsc::UnboundedReceiver<(String, DiscoveryEvent)>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(ChannelPublisher { tx }), rx)
    }
}

impl NotificationPublisher for ChannelPublisher {
    fn publish(&self, category: &str, event: DiscoveryEvent) {
        if self.tx.send((category.to_string(), event)).is_err() {
            debug!(category, "discovery event dropped: no receiver");
        }
    }
}
