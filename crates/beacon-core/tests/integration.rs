//! # Beacon Integration Tests
//!
//! End-to-end tests exercising the facade, bootstrapper, registry, and
//! store together.
//!
//! ## Coverage
//!
//! | Behavior | Test |
//! |----------|------|
//! | Built-in probe registration | `test_builtin_probe_registration` |
//! | Probe update forwarding | `test_probe_update_forwarded` |
//! | Stale built-in cleanup | `test_stale_builtin_removed` |
//! | Registration reuse across restart | `test_restart_reuses_registration` |
//! | Realm enablement config | `test_disabled_realm_probe_skipped` |
//! | External plugin event flow | `test_external_plugin_event_flow` |

use async_trait::async_trait;
use beacon_core::{
    Beacon, BeaconConfig, EventKind, IdentityResolver, Node, PlatformProbe, ProbeError,
    ResolveError, ResolvedIdentity, ServiceRef, TargetNode, DISCOVERY_CATEGORY,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

struct FixedResolver;

#[async_trait]
impl IdentityResolver for FixedResolver {
    async fn resolve(
        &self,
        target: &ServiceRef,
        _allow_stored_credentials: bool,
    ) -> Result<ResolvedIdentity, ResolveError> {
        Ok(ResolvedIdentity::new(format!("jvm-{}", target.connect_uri)))
    }
}

/// In-process probe with a controllable update stream.
struct TestProbe {
    realm: String,
    initial: Mutex<Vec<Node>>,
    tx: broadcast::Sender<Vec<Node>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl TestProbe {
    fn new(realm: &str, initial: Vec<Node>) -> Arc<Self> {
        let (tx, _) = broadcast::channel(16);
        Arc::new(TestProbe {
            realm: realm.to_string(),
            initial: Mutex::new(initial),
            tx,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    fn push_update(&self, children: Vec<Node>) {
        // No receiver just means the forwarder is not up yet.
        let _ = self.tx.send(children);
    }
}

#[async_trait]
impl PlatformProbe for TestProbe {
    fn realm(&self) -> &str {
        &self.realm
    }

    async fn start(&self) -> Result<(), ProbeError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProbeError> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn initial_children(&self) -> Result<Vec<Node>, ProbeError> {
        Ok(self.initial.lock().unwrap().clone())
    }

    fn updates(&self) -> broadcast::Receiver<Vec<Node>> {
        self.tx.subscribe()
    }
}

fn test_config(temp_dir: &TempDir) -> BeaconConfig {
    let mut config = BeaconConfig::default();
    config.store.db_path = temp_dir.path().join("plugins.db");
    config
}

fn target(uri: &str) -> Node {
    Node::Target(TargetNode::new(ServiceRef::new(uri)))
}

/// Polls `check` until it passes or a two-second deadline expires.
async fn wait_until(check: impl Fn() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within deadline");
}

#[tokio::test]
async fn test_builtin_probe_registration() {
    let temp_dir = TempDir::new().unwrap();
    let mut beacon = Beacon::new(test_config(&temp_dir), Arc::new(FixedResolver)).unwrap();

    let probe = TestProbe::new("LocalRealm", vec![target("svc://local-1:9091")]);
    beacon.register_probe(probe.clone());
    beacon.start().await.unwrap();

    assert!(probe.started.load(Ordering::SeqCst));

    let builtin = beacon
        .registry()
        .get_builtin_by_realm("LocalRealm")
        .unwrap()
        .expect("built-in registration should exist");
    assert!(builtin.is_builtin());

    let services = beacon.list_services().unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].connect_uri, "svc://local-1:9091");
    assert_eq!(services[0].jvm_id.as_deref(), Some("jvm-svc://local-1:9091"));

    beacon.shutdown().await;
    assert!(probe.stopped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_probe_update_forwarded() {
    let temp_dir = TempDir::new().unwrap();
    let mut beacon = Beacon::new(test_config(&temp_dir), Arc::new(FixedResolver)).unwrap();

    let probe = TestProbe::new("LocalRealm", vec![]);
    beacon.register_probe(probe.clone());
    beacon.start().await.unwrap();

    probe.push_update(vec![target("svc://late-arrival:9091")]);

    let registry = Arc::clone(beacon.registry());
    wait_until(move || {
        registry
            .list_services()
            .map(|s| s.iter().any(|r| r.connect_uri == "svc://late-arrival:9091"))
            .unwrap_or(false)
    })
    .await;

    beacon.shutdown().await;
}

#[tokio::test]
async fn test_stale_builtin_removed() {
    let temp_dir = TempDir::new().unwrap();

    {
        let mut beacon = Beacon::new(test_config(&temp_dir), Arc::new(FixedResolver)).unwrap();
        beacon.register_probe(TestProbe::new("OldRealm", vec![target("svc://old")]));
        beacon.start().await.unwrap();
        beacon.shutdown().await;
    }

    let mut beacon = Beacon::new(test_config(&temp_dir), Arc::new(FixedResolver)).unwrap();
    beacon.register_probe(TestProbe::new("NewRealm", vec![]));
    beacon.start().await.unwrap();

    assert!(beacon
        .registry()
        .get_builtin_by_realm("OldRealm")
        .unwrap()
        .is_none());
    assert!(beacon
        .registry()
        .get_builtin_by_realm("NewRealm")
        .unwrap()
        .is_some());

    beacon.shutdown().await;
}

#[tokio::test]
async fn test_restart_reuses_registration() {
    let temp_dir = TempDir::new().unwrap();

    let first_id = {
        let mut beacon = Beacon::new(test_config(&temp_dir), Arc::new(FixedResolver)).unwrap();
        beacon.register_probe(TestProbe::new("LocalRealm", vec![]));
        beacon.start().await.unwrap();
        let id = beacon
            .registry()
            .get_builtin_by_realm("LocalRealm")
            .unwrap()
            .unwrap()
            .id;
        beacon.shutdown().await;
        id
    };

    let mut beacon = Beacon::new(test_config(&temp_dir), Arc::new(FixedResolver)).unwrap();
    beacon.register_probe(TestProbe::new("LocalRealm", vec![]));
    beacon.start().await.unwrap();

    let second_id = beacon
        .registry()
        .get_builtin_by_realm("LocalRealm")
        .unwrap()
        .unwrap()
        .id;
    assert_eq!(second_id, first_id);

    beacon.shutdown().await;
}

#[tokio::test]
async fn test_disabled_realm_probe_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(&temp_dir);
    config.platform.enabled_realms = vec!["OnlyThisRealm".to_string()];

    let mut beacon = Beacon::new(config, Arc::new(FixedResolver)).unwrap();
    let probe = TestProbe::new("LocalRealm", vec![target("svc://local")]);
    beacon.register_probe(probe.clone());
    beacon.start().await.unwrap();

    assert!(!probe.started.load(Ordering::SeqCst));
    assert!(beacon
        .registry()
        .get_builtin_by_realm("LocalRealm")
        .unwrap()
        .is_none());

    beacon.shutdown().await;
}

#[tokio::test]
async fn test_external_plugin_event_flow() {
    let temp_dir = TempDir::new().unwrap();
    let mut beacon = Beacon::new(test_config(&temp_dir), Arc::new(FixedResolver)).unwrap();
    let mut events = beacon.take_events().unwrap();

    let id = beacon.register_plugin("ExternalRealm", None).await.unwrap();
    beacon
        .update_plugin(&id, vec![target("svc://remote-1:9091")])
        .await
        .unwrap();

    let (category, event) = events.recv().await.unwrap();
    assert_eq!(category, DISCOVERY_CATEGORY);
    assert_eq!(event.kind, EventKind::Found);
    assert_eq!(event.service_ref.connect_uri, "svc://remote-1:9091");

    beacon.deregister_plugin(&id).await.unwrap();
    let (_, event) = events.recv().await.unwrap();
    assert_eq!(event.kind, EventKind::Lost);
}
