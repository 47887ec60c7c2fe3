//! Target identity and metadata.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Keys for registry-maintained annotations on a [`ServiceRef`].
///
/// Unlike `platform_annotations` (supplied by the owning plugin), these are
/// written only by the registry itself. `Realm` is injected on every update
/// so a target can always be traced to the realm subtree that contains it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnnotationKey {
    /// Name of the realm subtree the target belongs to.
    Realm,
    /// Hostname extracted from the connect URI.
    Host,
    /// Port extracted from the connect URI.
    Port,
    /// Main class reported by the identity resolver.
    JavaMain,
    /// JVM start time reported by the identity resolver.
    StartTime,
}

/// Identity and metadata for one discoverable JVM target.
///
/// Two refs denote the same target when both carry a resolved `jvm_id` and
/// the ids match. Until resolution succeeds the connect URI is the fallback
/// identity, so a transient URI duplicate is tolerated rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRef {
    /// Resolver-assigned stable identity. Absent until resolution succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jvm_id: Option<String>,

    /// Network address used to reach the target. Required, and unique within
    /// a well-formed tree at any instant.
    pub connect_uri: String,

    /// Human label. Defaults to the connect URI when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Free-form labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Annotations supplied by the owning plugin.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub platform_annotations: BTreeMap<String, String>,

    /// Annotations maintained by the registry.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub registry_annotations: BTreeMap<AnnotationKey, String>,
}

impl ServiceRef {
    /// Creates a ref for the given connect URI with no resolved identity.
    pub fn new(connect_uri: impl Into<String>) -> Self {
        ServiceRef {
            jvm_id: None,
            connect_uri: connect_uri.into(),
            alias: None,
            labels: BTreeMap::new(),
            platform_annotations: BTreeMap::new(),
            registry_annotations: BTreeMap::new(),
        }
    }

    /// Builder-style alias setter.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Builder-style jvm_id setter.
    #[must_use]
    pub fn with_jvm_id(mut self, jvm_id: impl Into<String>) -> Self {
        self.jvm_id = Some(jvm_id.into());
        self
    }

    /// The alias, falling back to the connect URI when unset.
    pub fn effective_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.connect_uri)
    }

    /// Identity rule used by tree diffing: jvm_id equality when both sides
    /// are resolved, connect-URI equality otherwise.
    pub fn same_target(&self, other: &ServiceRef) -> bool {
        match (&self.jvm_id, &other.jvm_id) {
            (Some(a), Some(b)) => a == b,
            _ => self.connect_uri == other.connect_uri,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_alias_falls_back_to_uri() {
        let plain = ServiceRef::new("svc://a");
        assert_eq!(plain.effective_alias(), "svc://a");

        let named = ServiceRef::new("svc://a").with_alias("my-service");
        assert_eq!(named.effective_alias(), "my-service");
    }

    #[test]
    fn test_same_target_by_jvm_id() {
        let a = ServiceRef::new("svc://a").with_jvm_id("id-1");
        let b = ServiceRef::new("svc://b").with_jvm_id("id-1");
        let c = ServiceRef::new("svc://a").with_jvm_id("id-2");

        // Matching ids win even across different URIs.
        assert!(a.same_target(&b));
        // Differing ids lose even on the same URI.
        assert!(!a.same_target(&c));
    }

    #[test]
    fn test_same_target_uri_fallback_while_unresolved() {
        let unresolved = ServiceRef::new("svc://a");
        let resolved = ServiceRef::new("svc://a").with_jvm_id("id-1");
        let other = ServiceRef::new("svc://b");

        assert!(unresolved.same_target(&resolved));
        assert!(!unresolved.same_target(&other));
    }

    #[test]
    fn test_annotation_key_serializes_screaming() {
        let json = serde_json::to_string(&AnnotationKey::Realm).unwrap();
        assert_eq!(json, "\"REALM\"");
    }

    #[test]
    fn test_round_trip_with_annotations() {
        let mut sref = ServiceRef::new("svc://a").with_alias("a");
        sref.registry_annotations
            .insert(AnnotationKey::Realm, "realm-1".to_string());
        sref.platform_annotations
            .insert("pod".to_string(), "a-0".to_string());

        let json = serde_json::to_string(&sref).unwrap();
        let parsed: ServiceRef = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, sref);
    }
}
