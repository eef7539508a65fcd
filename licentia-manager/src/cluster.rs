//! In-process cluster: one coordinator and any number of nodes over a
//! [`LocalBus`].

use crate::admin::LicenseAdmin;
use crate::clock::Clock;
use crate::error::{ManagerError, ManagerResult};
use crate::node::{LicenseNode, LicensesService, NodeConfig};
use crate::notify::FeatureStatus;
use licentia_license::LicenseVerifier;
use licentia_registry::{
    Coordinator, CoordinatorConfig, CoordinatorHandle, LocalBus, MemoryStore, RegistryError,
    RegistryStore,
};
use licentia_types::NodeId;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// How often convergence is polled.
pub const CONVERGENCE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Waits until every service reports `feature` as `expected`.
///
/// Only enabled-ness is compared: `Unlicensed` satisfies `Disabled`.
///
/// # Errors
///
/// Returns [`ManagerError::ConvergenceTimeout`] if the nodes do not agree
/// within `timeout`, and [`ManagerError::NodeStopped`] if a node stops.
pub async fn await_feature_status(
    services: &[LicensesService],
    feature: &str,
    expected: FeatureStatus,
    timeout: Duration,
) -> ManagerResult<()> {
    let poll = async {
        loop {
            let mut converged = true;
            for service in services {
                if !service.is_running() {
                    return Err(ManagerError::NodeStopped(service.node_id()));
                }
                if service.is_feature_enabled(feature) != expected.is_enabled() {
                    converged = false;
                }
            }
            if converged {
                return Ok(());
            }
            tokio::time::sleep(CONVERGENCE_POLL_INTERVAL).await;
        }
    };

    tokio::time::timeout(timeout, poll)
        .await
        .map_err(|_| ManagerError::ConvergenceTimeout {
            feature: feature.to_string(),
            expected,
            waited: timeout,
        })?
}

/// Cluster configuration.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Nodes started with the cluster.
    pub nodes: usize,
    /// Per-message dissemination latency, if any.
    pub latency: Option<Duration>,
    /// Admission queue capacity of the coordinator.
    pub queue_capacity: usize,
    /// Event topic capacity of each node.
    pub event_capacity: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nodes: 3,
            latency: None,
            queue_capacity: CoordinatorConfig::default().queue_capacity,
            event_capacity: NodeConfig::default().event_capacity,
        }
    }
}

/// A whole cluster in one process.
pub struct LocalCluster {
    config: ClusterConfig,
    bus: Arc<LocalBus>,
    store: Arc<dyn RegistryStore>,
    verifier: LicenseVerifier,
    clock: Arc<dyn Clock>,
    coordinator: Option<Coordinator>,
    nodes: BTreeMap<NodeId, LicenseNode>,
}

impl LocalCluster {
    /// Starts a cluster over an in-memory store.
    pub async fn start(
        config: ClusterConfig,
        verifier: LicenseVerifier,
        clock: Arc<dyn Clock>,
    ) -> ManagerResult<Self> {
        Self::start_with_store(config, Arc::new(MemoryStore::new()), verifier, clock).await
    }

    /// Starts a cluster whose coordinator persists through `store`.
    pub async fn start_with_store(
        config: ClusterConfig,
        store: Arc<dyn RegistryStore>,
        verifier: LicenseVerifier,
        clock: Arc<dyn Clock>,
    ) -> ManagerResult<Self> {
        let bus = Arc::new(match config.latency {
            Some(latency) => LocalBus::with_latency(latency),
            None => LocalBus::new(),
        });

        let mut cluster = Self {
            config,
            bus,
            store,
            verifier,
            clock,
            coordinator: None,
            nodes: BTreeMap::new(),
        };
        cluster.start_coordinator().await?;
        for _ in 0..cluster.config.nodes {
            cluster.add_node().await?;
        }
        info!("Local cluster started with {} nodes", cluster.nodes.len());
        Ok(cluster)
    }

    async fn start_coordinator(&mut self) -> ManagerResult<()> {
        let coordinator = Coordinator::start(
            CoordinatorConfig {
                node_id: NodeId::new(),
                queue_capacity: self.config.queue_capacity,
            },
            Arc::clone(&self.store),
            self.bus.clone(),
        )
        .await?;
        self.coordinator = Some(coordinator);
        Ok(())
    }

    /// Returns the current coordinator's handle.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorUnavailable` if the coordinator was stopped.
    pub fn coordinator(&self) -> ManagerResult<CoordinatorHandle> {
        self.coordinator
            .as_ref()
            .map(Coordinator::handle)
            .ok_or_else(|| {
                RegistryError::CoordinatorUnavailable("no coordinator elected".to_string()).into()
            })
    }

    /// Returns an admin bound to the current coordinator.
    pub fn admin(&self) -> ManagerResult<LicenseAdmin> {
        Ok(LicenseAdmin::new(
            self.coordinator()?,
            self.verifier.clone(),
            Arc::clone(&self.clock),
        ))
    }

    /// Starts and joins a new node.
    pub async fn add_node(&mut self) -> ManagerResult<NodeId> {
        let config = NodeConfig {
            node_id: NodeId::new(),
            event_capacity: self.config.event_capacity,
        };
        let node = LicenseNode::start(
            config,
            self.bus.clone(),
            self.verifier.clone(),
            Arc::clone(&self.clock),
        )
        .await?;
        let node_id = node.node_id();
        self.nodes.insert(node_id, node);
        Ok(node_id)
    }

    /// Stops one node.
    pub async fn stop_node(&mut self, node_id: &NodeId) -> ManagerResult<()> {
        let node = self
            .nodes
            .remove(node_id)
            .ok_or(ManagerError::UnknownNode(*node_id))?;
        node.shutdown().await;
        Ok(())
    }

    /// Returns one node's service.
    pub fn node(&self, node_id: &NodeId) -> ManagerResult<LicensesService> {
        self.nodes
            .get(node_id)
            .map(LicenseNode::service)
            .ok_or(ManagerError::UnknownNode(*node_id))
    }

    /// Returns every running node's service.
    pub fn services(&self) -> Vec<LicensesService> {
        self.nodes.values().map(LicenseNode::service).collect()
    }

    /// Returns the ids of running nodes.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    /// The bus connecting the cluster, for injecting lag.
    pub fn bus(&self) -> &Arc<LocalBus> {
        &self.bus
    }

    /// Stops the coordinator without electing a successor.
    pub async fn stop_coordinator(&mut self) {
        if let Some(coordinator) = self.coordinator.take() {
            coordinator.shutdown().await;
        }
    }

    /// Stops the coordinator and elects a new one over the same store.
    pub async fn fail_over(&mut self) -> ManagerResult<CoordinatorHandle> {
        self.stop_coordinator().await;
        self.start_coordinator().await?;
        info!("Coordinator failed over");
        self.coordinator()
    }

    /// Waits until every running node reports `feature` as `expected`.
    pub async fn await_feature_status(
        &self,
        feature: &str,
        expected: FeatureStatus,
        timeout: Duration,
    ) -> ManagerResult<()> {
        await_feature_status(&self.services(), feature, expected, timeout).await
    }

    /// Stops every node and the coordinator.
    pub async fn shutdown(mut self) {
        let nodes = std::mem::take(&mut self.nodes);
        for (_, node) in nodes {
            node.shutdown().await;
        }
        self.stop_coordinator().await;
        info!("Local cluster stopped");
    }
}
