//! The persisted registration record.

use beacon_model::EnvironmentNode;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// One registered discovery plugin.
///
/// Created by `save`, its subtree mutated by the update operations, and the
/// whole row deleted on deregistration. The `id` is server-generated and
/// immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Server-generated opaque identifier.
    pub id: String,

    /// Plugin-chosen namespace name. Effectively unique among active
    /// registrations, but uniqueness is not hard-enforced here.
    pub realm: String,

    /// Callback address used for liveness pings. `None` marks a built-in,
    /// zero-probe plugin that the liveness loop never prunes.
    pub callback: Option<String>,

    /// The plugin's last-submitted subtree. Root name/type equal the realm
    /// name and the generic realm kind.
    pub subtree: EnvironmentNode,

    /// Unix-seconds timestamp of registration, used by the liveness loop's
    /// configurable grace period.
    pub registered_at: u64,
}

impl PluginInfo {
    /// True if this record is a built-in (no callback) registration.
    pub fn is_builtin(&self) -> bool {
        self.callback.is_none()
    }
}

/// Current wall-clock time as unix seconds. Clamped to zero if the system
/// clock is before the epoch.
pub(crate) fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
