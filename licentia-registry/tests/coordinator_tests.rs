mod common;

use common::{signed, Fixture};
use licentia_registry::{
    CommittedState, Coordinator, CoordinatorConfig, LocalBus, MemoryStore, RegistryError,
    RegistryReplica, RegistryResult, RegistryState, RegistryStore, ReplicationMessage,
    ReplicationTransport,
};
use licentia_types::NodeId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A store whose writes block for a while, like a slow disk.
struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
    writing: AtomicBool,
}

impl SlowStore {
    fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryStore::new(),
            delay,
            writing: AtomicBool::new(false),
        }
    }

    async fn wait_until_writing(&self) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !self.writing.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}

impl RegistryStore for SlowStore {
    fn load(&self) -> RegistryResult<Option<CommittedState>> {
        self.inner.load()
    }

    fn persist(&self, committed: &CommittedState) -> RegistryResult<()> {
        self.writing.store(true, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.inner.persist(committed)
    }
}

// ── Admission ────────────────────────────────────────────────────

#[tokio::test]
async fn starts_at_version_zero() {
    let fx = Fixture::new().await;
    let handle = fx.coordinator.handle();
    assert!(handle.is_running());
    assert_eq!(handle.node_id(), fx.coordinator.node_id());
    assert_eq!(handle.latest().version, 0);
    assert!(handle.latest().state.is_absent());
}

#[tokio::test]
async fn install_commits_next_version() {
    let fx = Fixture::new().await;
    let handle = fx.coordinator.handle();
    let license = signed("shield");

    let to_install = license.clone();
    let ack = handle
        .submit_update("install shield", move |state| state.install(to_install))
        .await
        .unwrap();

    assert_eq!(ack.version, 1);
    assert_eq!(ack.description, "install shield");
    assert!(ack.changed);
    assert_eq!(handle.latest().active_license(), Some(&license));
    assert_eq!(fx.store.last_persisted().unwrap().version, 1);
}

#[tokio::test]
async fn unchanged_state_is_a_noop() {
    let fx = Fixture::new().await;
    let handle = fx.coordinator.handle();
    let license = signed("shield");

    let first = license.clone();
    handle
        .submit_update("install", move |s| s.install(first))
        .await
        .unwrap();
    let ack = handle
        .submit_update("reinstall", move |s| s.install(license))
        .await
        .unwrap();

    assert!(!ack.changed);
    assert_eq!(ack.version, 1);
    assert_eq!(handle.latest().version, 1);
}

#[tokio::test]
async fn wipe_on_absent_state_is_a_noop() {
    let fx = Fixture::new().await;
    let ack = fx.coordinator.handle().wipe().await.unwrap();
    assert!(!ack.changed);
    assert_eq!(ack.version, 0);
}

#[tokio::test]
async fn concurrent_submissions_are_serialized() {
    let fx = Fixture::new().await;
    let handle = fx.coordinator.handle();

    let mut tasks = Vec::new();
    for i in 0..10 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            let license = signed(&format!("feature-{i}"));
            handle
                .submit_update(format!("install {i}"), move |s| s.install(license))
                .await
                .unwrap()
                .version
        }));
    }

    let mut versions = Vec::new();
    for task in tasks {
        versions.push(task.await.unwrap());
    }
    versions.sort_unstable();
    assert_eq!(versions, (1..=10).collect::<Vec<_>>());
    assert_eq!(handle.latest().version, 10);
}

// ── Failures ─────────────────────────────────────────────────────

#[tokio::test]
async fn mutation_error_leaves_state_unchanged() {
    let fx = Fixture::new().await;
    let handle = fx.coordinator.handle();

    let err = handle
        .submit_update("refuse", |_| Err(RegistryError::Rejected("nope".into())))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Rejected(_)));
    assert_eq!(handle.latest().version, 0);
}

#[tokio::test]
async fn panicking_mutation_is_rejected() {
    let fx = Fixture::new().await;
    let handle = fx.coordinator.handle();

    let err = handle
        .submit_update("explode", |_| -> Result<RegistryState, RegistryError> {
            panic!("boom")
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Rejected(_)));

    // The coordinator keeps admitting.
    let ack = handle
        .submit_update("install", |s| s.install(signed("shield")))
        .await
        .unwrap();
    assert_eq!(ack.version, 1);
}

#[tokio::test]
async fn persistence_failure_is_never_observed() {
    let fx = Fixture::new().await;
    let handle = fx.coordinator.handle();
    let mut inbox = fx.bus.join(NodeId::new()).await.unwrap();
    let mut replica = RegistryReplica::new(NodeId::new());

    fx.store.set_failing(true);
    let err = handle
        .submit_update("install", |s| s.install(signed("shield")))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Persistence(_)));
    assert!(err.is_retryable());
    assert_eq!(handle.latest().version, 0);

    fx.store.set_failing(false);
    let ack = handle
        .submit_update("install", |s| s.install(signed("shield")))
        .await
        .unwrap();
    assert_eq!(ack.version, 1);

    let message = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let message = inbox.recv().await.unwrap();
            if message.version() > 0 {
                return message;
            }
        }
    })
    .await
    .unwrap();
    let observed = replica.observe(message);
    assert_eq!(observed.len(), 1);
    assert_eq!(observed[0].version, 1);
}

#[tokio::test]
async fn shutdown_makes_submissions_unavailable() {
    let fx = Fixture::new().await;
    let handle = fx.coordinator.handle();
    fx.coordinator.shutdown().await;

    assert!(!handle.is_running());
    let err = handle.wipe().await.unwrap_err();
    assert!(matches!(err, RegistryError::CoordinatorUnavailable(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn shutdown_lets_the_update_being_persisted_commit() {
    let bus = Arc::new(LocalBus::new());
    let store = Arc::new(SlowStore::new(Duration::from_millis(200)));
    let coordinator = Coordinator::start(CoordinatorConfig::default(), store.clone(), bus.clone())
        .await
        .unwrap();
    let handle = coordinator.handle();

    let license = signed("shield");
    let uid = license.uid();
    let in_flight = tokio::spawn({
        let handle = handle.clone();
        async move {
            handle
                .submit_update("install", move |s| s.install(license))
                .await
        }
    });
    store.wait_until_writing().await;
    let queued = tokio::spawn({
        let handle = handle.clone();
        async move { handle.wipe().await }
    });
    tokio::task::yield_now().await;

    coordinator.shutdown().await;

    let ack = in_flight.await.unwrap().unwrap();
    assert!(ack.changed);
    assert_eq!(ack.version, 1);
    let err = queued.await.unwrap().unwrap_err();
    assert!(matches!(err, RegistryError::CoordinatorUnavailable(_)));
    assert_eq!(bus.latest().await.map(|c| c.version), Some(1));

    let successor = Coordinator::start(CoordinatorConfig::default(), store.clone(), bus.clone())
        .await
        .unwrap();
    let latest = successor.latest();
    assert_eq!(latest.version, 1);
    assert_eq!(latest.active_license().map(|l| l.uid()), Some(uid));
    successor.shutdown().await;
}

#[tokio::test]
async fn failed_persist_during_shutdown_stays_uncommitted() {
    let bus = Arc::new(LocalBus::new());
    let store = Arc::new(SlowStore::new(Duration::from_millis(200)));
    store.inner.set_failing(true);
    let coordinator = Coordinator::start(CoordinatorConfig::default(), store.clone(), bus.clone())
        .await
        .unwrap();
    let handle = coordinator.handle();

    let in_flight = tokio::spawn({
        let handle = handle.clone();
        async move {
            handle
                .submit_update("install", |s| s.install(signed("shield")))
                .await
        }
    });
    store.wait_until_writing().await;
    coordinator.shutdown().await;

    let err = in_flight.await.unwrap().unwrap_err();
    assert!(matches!(err, RegistryError::Persistence(_)));
    assert!(err.is_retryable());
    assert_eq!(bus.latest().await.map(|c| c.version), Some(0));

    store.inner.set_failing(false);
    let successor = Coordinator::start(CoordinatorConfig::default(), store.clone(), bus.clone())
        .await
        .unwrap();
    let latest = successor.latest();
    assert_eq!(latest.version, 0);
    assert!(latest.active_license().is_none());

    let ack = successor
        .handle()
        .submit_update("install", |s| s.install(signed("shield")))
        .await
        .unwrap();
    assert_eq!(ack.version, 1);
    successor.shutdown().await;
}

// ── Dissemination ────────────────────────────────────────────────

#[tokio::test]
async fn followers_observe_commits_in_order() {
    let fx = Fixture::new().await;
    let handle = fx.coordinator.handle();
    let mut inbox = fx.bus.join(NodeId::new()).await.unwrap();
    let mut replica = RegistryReplica::new(NodeId::new());

    for i in 0..5 {
        let license = signed(&format!("feature-{i}"));
        handle
            .submit_update("install", move |s| s.install(license))
            .await
            .unwrap();
    }

    let mut observed = Vec::new();
    tokio::time::timeout(Duration::from_secs(1), async {
        while replica.version() < 5 {
            let message = inbox.recv().await.unwrap();
            observed.extend(replica.observe(message).into_iter().map(|s| s.version));
        }
    })
    .await
    .unwrap();

    assert_eq!(observed, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn start_announces_snapshot() {
    let fx = Fixture::new().await;
    let latest = fx.bus.latest().await.unwrap();
    assert_eq!(latest.version, 0);
}

// ── Failover ─────────────────────────────────────────────────────

#[tokio::test]
async fn new_coordinator_resumes_numbering() {
    let fx = Fixture::new().await;
    let handle = fx.coordinator.handle();
    handle
        .submit_update("install", |s| s.install(signed("shield")))
        .await
        .unwrap();
    fx.coordinator.shutdown().await;

    let successor = Coordinator::start(
        CoordinatorConfig::default(),
        fx.store.clone(),
        fx.bus.clone(),
    )
    .await
    .unwrap();
    let handle = successor.handle();
    assert_eq!(handle.latest().version, 1);

    let ack = handle.wipe().await.unwrap();
    assert!(ack.changed);
    assert_eq!(ack.version, 2);

    match fx.bus.latest().await {
        Some(latest) => assert!(latest.version >= 1),
        None => panic!("bus never saw a publish"),
    }
}

#[tokio::test]
async fn joining_after_failover_sees_latest() {
    let fx = Fixture::new().await;
    fx.coordinator
        .handle()
        .submit_update("install", |s| s.install(signed("shield")))
        .await
        .unwrap();
    fx.coordinator.shutdown().await;

    let bus: Arc<dyn ReplicationTransport> = fx.bus.clone();
    let _successor = Coordinator::start(CoordinatorConfig::default(), fx.store.clone(), bus)
        .await
        .unwrap();

    let mut inbox = fx.bus.join(NodeId::new()).await.unwrap();
    match inbox.try_recv() {
        Some(ReplicationMessage::Snapshot(state)) => {
            assert_eq!(state.version, 1);
            assert!(state.active_license().is_some());
        }
        other => panic!("expected snapshot, got {other:?}"),
    }
}
