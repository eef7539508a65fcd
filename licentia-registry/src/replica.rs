//! Follower-side replica of the registry.
//!
//! Tracks the last observed version and enforces the ordering guarantee:
//! observed versions form a strictly increasing sequence with no gaps. A
//! commit that arrives ahead of its predecessor is buffered until the gap
//! is filled; stale and duplicate versions are dropped.

use crate::protocol::ReplicationMessage;
use crate::state::CommittedState;
use licentia_types::NodeId;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Read-only replica of the registry held by one follower.
#[derive(Debug)]
pub struct RegistryReplica {
    node_id: NodeId,
    current: CommittedState,
    /// Commits received ahead of their turn, keyed by version.
    pending: BTreeMap<u64, CommittedState>,
}

impl RegistryReplica {
    /// Creates a replica at the initial (absent, version 0) state.
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            current: CommittedState::initial(),
            pending: BTreeMap::new(),
        }
    }

    /// The follower owning this replica.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The last observed committed state.
    pub fn current(&self) -> &CommittedState {
        &self.current
    }

    /// The last observed version.
    pub fn version(&self) -> u64 {
        self.current.version
    }

    /// Number of commits buffered behind a gap.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feeds one replication message into the replica.
    ///
    /// Returns the states newly observed as a result, oldest first. The
    /// returned versions are strictly increasing and continue from the
    /// previously observed version.
    pub fn observe(&mut self, message: ReplicationMessage) -> Vec<CommittedState> {
        let mut observed = Vec::new();
        match message {
            ReplicationMessage::Snapshot(snapshot) => {
                if snapshot.version <= self.current.version {
                    debug!(
                        "Node {} ignoring snapshot v{} (at v{})",
                        self.node_id, snapshot.version, self.current.version
                    );
                    return observed;
                }
                self.pending.retain(|version, _| *version > snapshot.version);
                self.advance(snapshot, &mut observed);
            }
            ReplicationMessage::Commit(commit) => {
                let expected = self.current.version + 1;
                if commit.version < expected {
                    debug!(
                        "Node {} ignoring stale commit v{} (at v{})",
                        self.node_id, commit.version, self.current.version
                    );
                    return observed;
                }
                if commit.version > expected {
                    warn!(
                        "Node {} buffering commit v{}: waiting for v{}",
                        self.node_id, commit.version, expected
                    );
                    self.pending.insert(commit.version, commit);
                    return observed;
                }
                self.advance(commit, &mut observed);
            }
        }
        self.drain_pending(&mut observed);
        observed
    }

    fn advance(&mut self, next: CommittedState, observed: &mut Vec<CommittedState>) {
        self.current = next.clone();
        observed.push(next);
    }

    fn drain_pending(&mut self, observed: &mut Vec<CommittedState>) {
        while let Some(next) = self.pending.remove(&(self.current.version + 1)) {
            self.advance(next, observed);
        }
    }
}
