//! Registry behavior tests with stubbed collaborators.

use crate::events::{ChannelPublisher, DiscoveryEvent, EventKind};
use crate::probe::LivenessProber;
use crate::registry::{DiscoveryRegistry, RegistrySettings};
use crate::resolve::{IdentityResolver, ResolveError, ResolvedIdentity};
use crate::RegistryError;
use async_trait::async_trait;
use beacon_model::{EnvironmentNode, Node, NodeType, ServiceRef, TargetNode, REALM_LABEL};
use beacon_store::PluginStore;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Resolver that succeeds with a deterministic id unless a URI has been
/// marked as failing.
struct StubResolver {
    failing: Mutex<HashSet<String>>,
}

impl StubResolver {
    fn new() -> Arc<Self> {
        Arc::new(StubResolver {
            failing: Mutex::new(HashSet::new()),
        })
    }

    fn fail_for(&self, uri: &str) {
        self.failing.lock().unwrap().insert(uri.to_string());
    }

    fn recover(&self, uri: &str) {
        self.failing.lock().unwrap().remove(uri);
    }
}

#[async_trait]
impl IdentityResolver for StubResolver {
    async fn resolve(
        &self,
        target: &ServiceRef,
        _allow_stored_credentials: bool,
    ) -> std::result::Result<ResolvedIdentity, ResolveError> {
        if self.failing.lock().unwrap().contains(&target.connect_uri) {
            Err(ResolveError::new(&target.connect_uri, "attach refused"))
        } else {
            Ok(ResolvedIdentity::new(format!("jvm-{}", target.connect_uri))
                .with_java_main("com.example.Main")
                .with_start_time("1724932800"))
        }
    }
}

/// Prober that answers from a mutable dead-set.
struct StubProber {
    dead: Mutex<HashSet<String>>,
}

impl StubProber {
    fn new() -> Arc<Self> {
        Arc::new(StubProber {
            dead: Mutex::new(HashSet::new()),
        })
    }

    fn mark_dead(&self, callback: &str) {
        self.dead.lock().unwrap().insert(callback.to_string());
    }
}

#[async_trait]
impl LivenessProber for StubProber {
    async fn ping(&self, callback: Option<&str>) -> bool {
        match callback {
            None => true,
            Some(cb) => !self.dead.lock().unwrap().contains(cb),
        }
    }
}

type EventRx = UnboundedReceiver<(String, DiscoveryEvent)>;

fn registry_with(
    settings: RegistrySettings,
) -> (Arc<DiscoveryRegistry>, EventRx, Arc<StubResolver>, Arc<StubProber>) {
    let store = PluginStore::temporary().unwrap();
    let resolver = StubResolver::new();
    let prober = StubProber::new();
    let (publisher, rx) = ChannelPublisher::new();

    let registry = DiscoveryRegistry::builder(store, resolver.clone(), publisher)
        .with_settings(settings)
        .with_prober(prober.clone())
        .build()
        .unwrap();
    (Arc::new(registry), rx, resolver, prober)
}

fn registry() -> (Arc<DiscoveryRegistry>, EventRx, Arc<StubResolver>, Arc<StubProber>) {
    registry_with(RegistrySettings::default())
}

fn target(uri: &str) -> Node {
    Node::Target(TargetNode::new(ServiceRef::new(uri)))
}

fn drain(rx: &mut EventRx) -> Vec<DiscoveryEvent> {
    let mut events = Vec::new();
    while let Ok((_, event)) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_registration_round_trip() {
    let (registry, _rx, _resolver, _prober) = registry();

    let id = registry.register("KubernetesRealm", None).await.unwrap();
    let info = registry.get_by_id(&id).unwrap().unwrap();

    assert_eq!(info.realm, "KubernetesRealm");
    assert!(info.is_builtin());
    assert!(info.subtree.children.is_empty());
    assert_eq!(info.subtree.labels.get(REALM_LABEL), Some(&id));
    assert_eq!(info.subtree.node_type, NodeType::realm());
}

#[tokio::test]
async fn test_registration_probes_callback_first() {
    let (registry, _rx, _resolver, prober) = registry();
    prober.mark_dead("http://plugin-1:8080/health");

    let err = registry
        .register("ExternalRealm", Some("http://plugin-1:8080/health".to_string()))
        .await
        .unwrap_err();

    assert!(matches!(err, RegistryError::RegistrationFailed { .. }));
    assert!(registry.list_services().unwrap().is_empty());
}

#[tokio::test]
async fn test_update_resolves_and_publishes_found() {
    let (registry, mut rx, _resolver, _prober) = registry();
    let id = registry.register("KubernetesRealm", None).await.unwrap();

    let children = registry
        .update(&id, vec![target("svc://app-1:9091")])
        .await
        .unwrap();

    let Node::Target(t) = &children[0] else {
        panic!("expected a target node");
    };
    assert_eq!(t.target.jvm_id.as_deref(), Some("jvm-svc://app-1:9091"));
    assert_eq!(
        t.target
            .registry_annotations
            .get(&beacon_model::AnnotationKey::Realm),
        Some(&"KubernetesRealm".to_string())
    );

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Found);
    assert_eq!(events[0].service_ref.connect_uri, "svc://app-1:9091");
}

#[tokio::test]
async fn test_resolution_metadata_annotated() {
    let (registry, _rx, _resolver, _prober) = registry();
    let id = registry.register("KubernetesRealm", None).await.unwrap();

    let children = registry
        .update(&id, vec![target("svc://app-1:9091")])
        .await
        .unwrap();

    let Node::Target(t) = &children[0] else {
        panic!("expected a target node");
    };
    assert_eq!(
        t.target
            .registry_annotations
            .get(&beacon_model::AnnotationKey::JavaMain),
        Some(&"com.example.Main".to_string())
    );
    assert_eq!(
        t.target
            .registry_annotations
            .get(&beacon_model::AnnotationKey::StartTime),
        Some(&"1724932800".to_string())
    );
}

#[tokio::test]
async fn test_identical_update_publishes_nothing() {
    let (registry, mut rx, _resolver, _prober) = registry();
    let id = registry.register("KubernetesRealm", None).await.unwrap();

    registry
        .update(&id, vec![target("svc://app-1:9091")])
        .await
        .unwrap();
    drain(&mut rx);

    registry
        .update(&id, vec![target("svc://app-1:9091")])
        .await
        .unwrap();
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_unresolved_target_stays_visible() {
    let (registry, mut rx, resolver, _prober) = registry();
    resolver.fail_for("svc://slow-starter:9091");
    let id = registry.register("KubernetesRealm", None).await.unwrap();

    registry
        .update(&id, vec![target("svc://slow-starter:9091")])
        .await
        .unwrap();

    let services = registry.list_services().unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].connect_uri, "svc://slow-starter:9091");
    assert!(services[0].jvm_id.is_none());
    assert_eq!(registry.pending_resolutions().await, 1);

    // Visibility is not gated on resolution.
    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Found);
}

#[tokio::test]
async fn test_deregister_publishes_lost_for_each_leaf() {
    let (registry, mut rx, _resolver, _prober) = registry();
    let id = registry.register("KubernetesRealm", None).await.unwrap();
    registry.update(&id, vec![target("svc://a")]).await.unwrap();
    drain(&mut rx);

    registry.deregister(&id).await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Lost);
    assert_eq!(events[0].service_ref.connect_uri, "svc://a");

    assert!(registry.get_by_id(&id).unwrap().is_none());
    assert!(matches!(
        registry.deregister(&id).await,
        Err(RegistryError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_event_order_within_one_update() {
    let (registry, mut rx, _resolver, _prober) = registry();
    let id = registry.register("KubernetesRealm", None).await.unwrap();

    registry
        .update(&id, vec![target("svc://a"), target("svc://b")])
        .await
        .unwrap();
    drain(&mut rx);

    let renamed = Node::Target(TargetNode::new(
        ServiceRef::new("svc://a").with_alias("renamed"),
    ));
    registry
        .update(&id, vec![renamed, target("svc://c")])
        .await
        .unwrap();

    let kinds: Vec<_> = drain(&mut rx).into_iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EventKind::Modified, EventKind::Found, EventKind::Lost]
    );
}

#[tokio::test]
async fn test_update_rejects_unknown_and_malformed() {
    let (registry, _rx, _resolver, _prober) = registry();

    assert!(matches!(
        registry.update("no-such-id", vec![target("svc://a")]).await,
        Err(RegistryError::NotFound(_))
    ));

    let id = registry.register("KubernetesRealm", None).await.unwrap();
    assert!(matches!(
        registry.update(&id, vec![target("")]).await,
        Err(RegistryError::InvalidTree(_))
    ));
    let unnamed = Node::Environment(EnvironmentNode::new("", NodeType::new(["Hosts"])));
    assert!(matches!(
        registry.update(&id, vec![unnamed]).await,
        Err(RegistryError::InvalidTree(_))
    ));
}

#[tokio::test]
async fn test_submitted_ids_are_discarded() {
    let (registry, _rx, _resolver, _prober) = registry();
    let id = registry.register("KubernetesRealm", None).await.unwrap();

    let mut node = TargetNode::new(ServiceRef::new("svc://a"));
    node.id = Some(999);
    let children = registry.update(&id, vec![Node::Target(node)]).await.unwrap();

    assert_eq!(children[0].id(), None);
}

#[tokio::test]
async fn test_discovery_tree_shape() {
    let (registry, _rx, _resolver, _prober) = registry();
    let zebra = registry.register("ZebraRealm", None).await.unwrap();
    let alpha = registry.register("AlphaRealm", None).await.unwrap();
    registry.update(&zebra, vec![target("svc://z")]).await.unwrap();
    registry.update(&alpha, vec![target("svc://a")]).await.unwrap();

    let tree = registry.discovery_tree().unwrap();
    assert_eq!(tree.name, "Universe");
    assert_eq!(tree.node_type, NodeType::universe());
    assert_eq!(tree.id, Some(0));

    // Children sorted by name, ids assigned depth-first.
    let names: Vec<_> = tree.children.iter().map(|c| c.name().to_string()).collect();
    assert_eq!(names, vec!["AlphaRealm", "ZebraRealm"]);
    let Node::Environment(first) = &tree.children[0] else {
        panic!("expected an environment node");
    };
    assert_eq!(first.id, Some(1));
    assert_eq!(first.children[0].id(), Some(2));
}

#[tokio::test]
async fn test_prune_removes_stale_preserves_live() {
    let (registry, mut rx, _resolver, prober) = registry();
    let stale = registry
        .register("StaleRealm", Some("http://stale:8080/health".to_string()))
        .await
        .unwrap();
    let live = registry
        .register("LiveRealm", Some("http://live:8080/health".to_string()))
        .await
        .unwrap();
    let builtin = registry.register("BuiltinRealm", None).await.unwrap();
    registry.update(&stale, vec![target("svc://s")]).await.unwrap();
    drain(&mut rx);

    prober.mark_dead("http://stale:8080/health");
    registry.prune_tick().await;

    assert!(registry.get_by_id(&stale).unwrap().is_none());
    assert!(registry.get_by_id(&live).unwrap().is_some());
    assert!(registry.get_by_id(&builtin).unwrap().is_some());

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Lost);
    assert_eq!(events[0].service_ref.connect_uri, "svc://s");
}

#[tokio::test]
async fn test_grace_period_defers_pruning() {
    let settings = RegistrySettings::default().with_registration_grace(Duration::from_secs(3600));
    let (registry, _rx, _resolver, prober) = registry_with(settings);

    let id = registry
        .register("FreshRealm", Some("http://fresh:8080/health".to_string()))
        .await
        .unwrap();
    prober.mark_dead("http://fresh:8080/health");

    registry.prune_tick().await;
    assert!(registry.get_by_id(&id).unwrap().is_some());
}

#[tokio::test]
async fn test_retry_resolves_eventually() {
    let (registry, mut rx, resolver, _prober) = registry();
    resolver.fail_for("svc://slow:9091");
    let id = registry.register("KubernetesRealm", None).await.unwrap();
    registry.update(&id, vec![target("svc://slow:9091")]).await.unwrap();
    drain(&mut rx);

    registry.retry_tick().await;
    assert_eq!(registry.pending_resolutions().await, 1);
    assert!(drain(&mut rx).is_empty());

    resolver.recover("svc://slow:9091");
    registry.retry_tick().await;

    assert_eq!(registry.pending_resolutions().await, 0);
    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Modified);
    assert_eq!(events[0].service_ref.jvm_id.as_deref(), Some("jvm-svc://slow:9091"));

    let services = registry.list_services_of(&id).unwrap();
    assert_eq!(services[0].jvm_id.as_deref(), Some("jvm-svc://slow:9091"));
}

#[tokio::test]
async fn test_credentials_added_triggers_immediate_retry() {
    let (registry, mut rx, resolver, _prober) = registry();
    resolver.fail_for("svc://secure-1:9091");
    let id = registry.register("KubernetesRealm", None).await.unwrap();
    registry
        .update(&id, vec![target("svc://secure-1:9091")])
        .await
        .unwrap();
    drain(&mut rx);

    resolver.recover("svc://secure-1:9091");
    registry.credentials_added("secure-").await;

    assert_eq!(registry.pending_resolutions().await, 0);
    assert_eq!(drain(&mut rx)[0].kind, EventKind::Modified);
}

#[tokio::test]
async fn test_credentials_added_ignores_non_matching() {
    let (registry, _rx, resolver, _prober) = registry();
    resolver.fail_for("svc://secure-1:9091");
    let id = registry.register("KubernetesRealm", None).await.unwrap();
    registry
        .update(&id, vec![target("svc://secure-1:9091")])
        .await
        .unwrap();

    resolver.recover("svc://secure-1:9091");
    registry.credentials_added("^other-host$").await;

    assert_eq!(registry.pending_resolutions().await, 1);
}

#[tokio::test]
async fn test_validate_renewal() {
    let (registry, _rx, _resolver, _prober) = registry();
    let id = registry
        .register("ExternalRealm", Some("http://p:8080/health".to_string()))
        .await
        .unwrap();

    assert!(registry
        .validate_renewal(&id, "ExternalRealm", Some("http://p:8080/health"))
        .unwrap());
    assert!(!registry
        .validate_renewal(&id, "OtherRealm", Some("http://p:8080/health"))
        .unwrap());
    assert!(!registry.validate_renewal(&id, "ExternalRealm", None).unwrap());
    assert!(!registry
        .validate_renewal("no-such-id", "ExternalRealm", None)
        .unwrap());
}

#[tokio::test]
async fn test_builtin_lookup_prefers_no_callback() {
    let (registry, _rx, _resolver, _prober) = registry();
    registry
        .register("SharedRealm", Some("http://external:8080/health".to_string()))
        .await
        .unwrap();
    let builtin = registry.register("SharedRealm", None).await.unwrap();

    let found = registry.get_builtin_by_realm("SharedRealm").unwrap().unwrap();
    assert_eq!(found.id, builtin);
    assert!(found.is_builtin());
}

#[tokio::test]
async fn test_spawned_loops_shut_down() {
    let settings = RegistrySettings::default()
        .with_prune_period(Duration::from_millis(10))
        .with_retry_period(Duration::from_millis(10));
    let (registry, _rx, _resolver, _prober) = registry_with(settings);

    let loops = Arc::clone(&registry).spawn_loops();
    tokio::time::sleep(Duration::from_millis(30)).await;
    loops.shutdown().await;

    // Both loop tasks must have released their registry handles by the time
    // shutdown returns.
    assert_eq!(Arc::strong_count(&registry), 1);
}
