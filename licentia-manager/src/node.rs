//! A cluster node: replica, manager and the event loop that drives them.

use crate::clock::Clock;
use crate::error::{ManagerError, ManagerResult};
use crate::manager::{FeatureSnapshot, LicensesManager, Trigger};
use crate::notify::{spawn_delivery, FeatureEvent, FeatureFilter, FeatureListener, FeatureStatus, Subscription};
use licentia_license::LicenseVerifier;
use licentia_registry::{FollowerInbox, RegistryReplica, ReplicationTransport};
use licentia_types::NodeId;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// This node's identity.
    pub node_id: NodeId,
    /// Capacity of the feature event topic. Slower subscribers resync.
    pub event_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::new(),
            event_capacity: 256,
        }
    }
}

/// Cloneable query and subscription surface of a running node.
#[derive(Clone)]
pub struct LicensesService {
    node_id: NodeId,
    snapshots: watch::Receiver<FeatureSnapshot>,
    events: broadcast::Sender<FeatureEvent>,
    running: Arc<AtomicBool>,
}

impl LicensesService {
    /// The node this service belongs to.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Returns true if `feature` is currently enabled on this node.
    pub fn is_feature_enabled(&self, feature: &str) -> bool {
        self.snapshots.borrow().is_enabled(feature)
    }

    /// Returns the currently enabled features.
    pub fn enabled_features(&self) -> BTreeSet<String> {
        self.snapshots.borrow().enabled.clone()
    }

    /// Returns the lifecycle status of `feature`.
    pub fn feature_status(&self, feature: &str) -> FeatureStatus {
        self.snapshots.borrow().status(feature)
    }

    /// Returns the full current snapshot.
    pub fn snapshot(&self) -> FeatureSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Returns the registry version this node has applied.
    pub fn observed_version(&self) -> u64 {
        self.snapshots.borrow().version
    }

    /// Returns true while the node's event loop runs.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Attaches a listener. It is first told about every currently enabled
    /// feature, then about each later transition that passes `filter`.
    pub fn subscribe(
        &self,
        listener: Arc<dyn FeatureListener>,
        filter: FeatureFilter,
    ) -> Subscription {
        let events = self.events.subscribe();
        spawn_delivery(listener, filter, events, self.snapshots.clone())
    }

    /// Returns a raw receiver on the event topic.
    pub fn events(&self) -> broadcast::Receiver<FeatureEvent> {
        self.events.subscribe()
    }

    /// Waits until the snapshot changes.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::NodeStopped`] once the node has shut down.
    pub async fn changed(&mut self) -> ManagerResult<()> {
        self.snapshots
            .changed()
            .await
            .map_err(|_| ManagerError::NodeStopped(self.node_id))
    }
}

impl std::fmt::Debug for LicensesService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicensesService")
            .field("node_id", &self.node_id)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// The state owned by a node's event loop.
struct NodeLoop {
    replica: RegistryReplica,
    manager: LicensesManager,
    inbox: FollowerInbox,
    transport: Arc<dyn ReplicationTransport>,
    clock: Arc<dyn Clock>,
    running: Arc<AtomicBool>,
}

impl NodeLoop {
    async fn run(mut self, mut shutdown_rx: oneshot::Receiver<()>) {
        let node_id = self.replica.node_id();
        loop {
            let deadline = self.manager.next_deadline();
            let wait = deadline.map(|at| self.clock.now().until(at));

            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("Node {} received shutdown", node_id);
                    break;
                }
                message = self.inbox.recv() => {
                    let Some(message) = message else {
                        debug!("Node {} inbox closed", node_id);
                        break;
                    };
                    let observed = self.replica.observe(message);
                    if observed.is_empty() {
                        continue;
                    }
                    for committed in observed {
                        self.manager.apply(Trigger::RegistryChanged(committed), self.clock.now());
                    }
                    let nodes = self.transport.followers().await.len();
                    self.manager.note_cluster_size(nodes);
                }
                _ = sleep_for(wait) => {
                    debug!("Node {} deadline reached", node_id);
                    self.manager.apply(Trigger::Timer, self.clock.now());
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        self.transport.leave(&node_id).await;
        info!("Node {} stopped at version {}", node_id, self.replica.version());
    }
}

/// Sleeps for `wait`, or forever when there is no deadline.
async fn sleep_for(wait: Option<std::time::Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending().await,
    }
}

/// A running node.
pub struct LicenseNode {
    service: LicensesService,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl LicenseNode {
    /// Joins `transport` and starts the node's event loop.
    ///
    /// # Errors
    ///
    /// Returns a registry error if the transport refuses the join.
    pub async fn start(
        config: NodeConfig,
        transport: Arc<dyn ReplicationTransport>,
        verifier: LicenseVerifier,
        clock: Arc<dyn Clock>,
    ) -> ManagerResult<Self> {
        let inbox = transport.join(config.node_id).await?;
        let manager = LicensesManager::new(
            config.node_id,
            verifier,
            config.event_capacity,
            clock.now(),
        );
        let running = Arc::new(AtomicBool::new(true));
        let service = LicensesService {
            node_id: config.node_id,
            snapshots: manager.snapshots(),
            events: manager.events(),
            running: Arc::clone(&running),
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let node_loop = NodeLoop {
            replica: RegistryReplica::new(config.node_id),
            manager,
            inbox,
            transport,
            clock,
            running,
        };
        let task = tokio::spawn(node_loop.run(shutdown_rx));
        info!("Node {} started", config.node_id);

        Ok(Self {
            service,
            shutdown_tx,
            task,
        })
    }

    /// This node's identity.
    pub fn node_id(&self) -> NodeId {
        self.service.node_id
    }

    /// Returns the node's query surface.
    pub fn service(&self) -> LicensesService {
        self.service.clone()
    }

    /// Stops the event loop and leaves the transport. The replica is dropped.
    pub async fn shutdown(self) {
        // The loop may already have exited on its own.
        let _ = self.shutdown_tx.send(());
        let _ = self.task.await;
    }
}
