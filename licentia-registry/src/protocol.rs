//! Replication protocol messages.
//!
//! The coordinator pushes whole snapshots, one per committed version:
//! 1. A joining follower first receives the latest snapshot
//! 2. Every subsequent commit is published in version order
//!
//! Since every message carries the full state, a follower that is behind
//! only needs the next version to catch up, never a replay of deltas.

use crate::error::{RegistryError, RegistryResult};
use crate::state::CommittedState;
use serde::{Deserialize, Serialize};

/// Protocol version for compatibility checking.
pub const PROTOCOL_VERSION: u32 = 1;

/// A replication message from the coordinator to followers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicationMessage {
    /// Latest state, sent to seed a joining follower or after a coordinator
    /// change. Accepted whenever it is newer than what the follower holds.
    Snapshot(CommittedState),

    /// A newly committed version. Applied strictly in version order.
    Commit(CommittedState),
}

impl ReplicationMessage {
    /// Returns the committed state carried by this message.
    pub fn committed(&self) -> &CommittedState {
        match self {
            Self::Snapshot(c) | Self::Commit(c) => c,
        }
    }

    /// Returns the version carried by this message.
    pub fn version(&self) -> u64 {
        self.committed().version
    }

    /// Encodes the message for a byte-oriented transport.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if JSON encoding fails.
    pub fn encode(&self) -> RegistryResult<Vec<u8>> {
        let wire = WireMessage {
            protocol_version: PROTOCOL_VERSION,
            message: self.clone(),
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    /// Decodes a message produced by [`ReplicationMessage::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Protocol`] on a version mismatch and a
    /// serialization error on malformed input.
    pub fn decode(bytes: &[u8]) -> RegistryResult<Self> {
        let wire: WireMessage = serde_json::from_slice(bytes)?;
        if wire.protocol_version != PROTOCOL_VERSION {
            return Err(RegistryError::Protocol(format!(
                "version mismatch: expected {PROTOCOL_VERSION}, got {}",
                wire.protocol_version
            )));
        }
        Ok(wire.message)
    }
}

/// Versioned frame used on byte-oriented transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Protocol version of the sender.
    pub protocol_version: u32,
    /// The replication message.
    pub message: ReplicationMessage,
}
