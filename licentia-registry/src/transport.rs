//! Dissemination transport abstraction.
//!
//! The coordinator publishes through a [`ReplicationTransport`]; followers
//! join it and read their [`FollowerInbox`]. Any transport that delivers each
//! follower's messages in publish order can stand in for the in-process
//! [`LocalBus`].

use crate::error::RegistryResult;
use crate::protocol::ReplicationMessage;
use crate::state::CommittedState;
use async_trait::async_trait;
use licentia_types::NodeId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

/// Ordered stream of replication messages for one follower.
pub struct FollowerInbox {
    node_id: NodeId,
    rx: mpsc::UnboundedReceiver<ReplicationMessage>,
}

impl FollowerInbox {
    /// Wraps a transport-specific receiver.
    pub fn new(node_id: NodeId, rx: mpsc::UnboundedReceiver<ReplicationMessage>) -> Self {
        Self { node_id, rx }
    }

    /// The follower this inbox belongs to.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Receives the next message. Returns `None` once the transport drops
    /// the follower.
    pub async fn recv(&mut self) -> Option<ReplicationMessage> {
        self.rx.recv().await
    }

    /// Receives a message if one is immediately available.
    pub fn try_recv(&mut self) -> Option<ReplicationMessage> {
        self.rx.try_recv().ok()
    }
}

/// A transport that pushes committed registry versions to followers.
#[async_trait]
pub trait ReplicationTransport: Send + Sync {
    /// Publishes a message to every joined follower, in order with respect to
    /// previous publishes. Returns the number of followers reached.
    async fn publish(&self, message: ReplicationMessage) -> RegistryResult<usize>;

    /// Registers a follower. The inbox first yields the latest published
    /// state (if any), then every later publish.
    async fn join(&self, node_id: NodeId) -> RegistryResult<FollowerInbox>;

    /// Removes a follower. Its inbox ends.
    async fn leave(&self, node_id: &NodeId);

    /// Returns the currently joined followers.
    async fn followers(&self) -> Vec<NodeId>;
}

/// Per-follower delivery slot.
struct FollowerSlot {
    tx: mpsc::UnboundedSender<ReplicationMessage>,
    /// Messages withheld while the follower is held back.
    held: Option<Vec<ReplicationMessage>>,
}

impl FollowerSlot {
    fn deliver(&mut self, message: ReplicationMessage) -> bool {
        match &mut self.held {
            Some(queue) => {
                queue.push(message);
                true
            }
            None => self.tx.send(message).is_ok(),
        }
    }
}

#[derive(Default)]
struct BusState {
    followers: HashMap<NodeId, FollowerSlot>,
    latest: Option<CommittedState>,
}

/// In-process transport: one ordered queue per follower.
///
/// Optional per-message latency models dissemination delay, and individual
/// followers can be held back to model arbitrary lag.
#[derive(Default)]
pub struct LocalBus {
    state: Mutex<BusState>,
    latency: Option<Duration>,
}

impl LocalBus {
    /// Creates a bus with immediate delivery.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus that delays every delivery by `latency`.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            state: Mutex::new(BusState::default()),
            latency: Some(latency),
        }
    }

    /// Returns the latest state published on this bus.
    pub async fn latest(&self) -> Option<CommittedState> {
        self.state.lock().await.latest.clone()
    }

    /// Withholds deliveries to `node_id` until [`LocalBus::release`].
    pub async fn hold(&self, node_id: &NodeId) {
        if let Some(slot) = self.state.lock().await.followers.get_mut(node_id) {
            slot.held.get_or_insert_with(Vec::new);
            debug!("Holding deliveries to follower {}", node_id);
        }
    }

    /// Delivers everything withheld from `node_id`, in order, and resumes
    /// normal delivery.
    pub async fn release(&self, node_id: &NodeId) {
        if let Some(slot) = self.state.lock().await.followers.get_mut(node_id) {
            if let Some(queue) = slot.held.take() {
                debug!("Releasing {} held messages to follower {}", queue.len(), node_id);
                for message in queue {
                    if slot.tx.send(message).is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Builds the sending side for a follower, inserting a delay stage when
    /// the bus has latency configured.
    fn follower_channel(
        &self,
    ) -> (
        mpsc::UnboundedSender<ReplicationMessage>,
        mpsc::UnboundedReceiver<ReplicationMessage>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let Some(latency) = self.latency else {
            return (tx, rx);
        };

        let (delayed_tx, delayed_rx) = mpsc::unbounded_channel();
        let mut rx = rx;
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                tokio::time::sleep(latency).await;
                if delayed_tx.send(message).is_err() {
                    break;
                }
            }
        });
        (tx, delayed_rx)
    }
}

#[async_trait]
impl ReplicationTransport for LocalBus {
    async fn publish(&self, message: ReplicationMessage) -> RegistryResult<usize> {
        let mut state = self.state.lock().await;

        let newer = state
            .latest
            .as_ref()
            .is_none_or(|latest| message.version() > latest.version);
        if newer {
            state.latest = Some(message.committed().clone());
        }

        let mut reached = 0;
        let mut gone = Vec::new();
        for (node_id, slot) in state.followers.iter_mut() {
            if slot.deliver(message.clone()) {
                reached += 1;
            } else {
                gone.push(*node_id);
            }
        }
        for node_id in gone {
            debug!("Dropping follower {} with closed inbox", node_id);
            state.followers.remove(&node_id);
        }
        Ok(reached)
    }

    async fn join(&self, node_id: NodeId) -> RegistryResult<FollowerInbox> {
        let (tx, rx) = self.follower_channel();
        let mut state = self.state.lock().await;
        if let Some(latest) = &state.latest {
            // Ignore the error: the receiver is in hand and cannot be closed yet.
            let _ = tx.send(ReplicationMessage::Snapshot(latest.clone()));
        }
        state.followers.insert(node_id, FollowerSlot { tx, held: None });
        info!("Follower {} joined ({} total)", node_id, state.followers.len());
        Ok(FollowerInbox::new(node_id, rx))
    }

    async fn leave(&self, node_id: &NodeId) {
        if self.state.lock().await.followers.remove(node_id).is_some() {
            info!("Follower {} left", node_id);
        }
    }

    async fn followers(&self) -> Vec<NodeId> {
        self.state.lock().await.followers.keys().copied().collect()
    }
}
