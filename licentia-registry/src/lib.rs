//! Replicated license registry for Licentia.
//!
//! The registry holds one authoritative [`RegistryState`] (zero or one active
//! license) and replicates it to every node of the cluster.
//!
//! # Architecture
//!
//! Replication is single-coordinator, snapshot-per-version:
//!
//! - **Coordinator**: the only writer. Submissions go through one admission
//!   queue and are applied one at a time to the latest committed snapshot.
//! - **Store**: each change is persisted before it is considered committed.
//! - **Dissemination**: committed snapshots are pushed to followers in commit
//!   order by a background task; submitters are acknowledged on local commit.
//! - **Replica**: each follower tracks the last observed version and only
//!   advances one version at a time, buffering anything that arrives early.
//!
//! ## Update Flow
//!
//! 1. **Submit**: caller hands a description and a mutation to the coordinator
//! 2. **Admit**: the admission loop applies the mutation to the latest snapshot
//! 3. **Persist**: the new version is written through the [`RegistryStore`]
//! 4. **Ack**: the caller's future resolves with the committed version
//! 5. **Disseminate**: the snapshot is published to every follower
//!
//! # Example
//!
//! ```
//! use licentia_registry::{Coordinator, CoordinatorConfig, LocalBus, MemoryStore};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> licentia_registry::RegistryResult<()> {
//! let bus = Arc::new(LocalBus::new());
//! let store = Arc::new(MemoryStore::new());
//! let coordinator = Coordinator::start(CoordinatorConfig::default(), store, bus).await?;
//!
//! let ack = coordinator.handle().wipe().await?;
//! assert!(!ack.changed);
//! # Ok(())
//! # }
//! ```

mod coordinator;
mod error;
pub mod protocol;
mod replica;
mod state;
pub mod store;
pub mod transport;

pub use coordinator::{Coordinator, CoordinatorConfig, CoordinatorHandle, Mutation, UpdateAck};
pub use error::{RegistryError, RegistryResult};
pub use protocol::{ReplicationMessage, WireMessage, PROTOCOL_VERSION};
pub use replica::RegistryReplica;
pub use state::{CommittedState, LicensesMetadata, RegistryState};
pub use store::{ClusterConfigFile, MemoryStore, RegistryStore, LICENSES_ENTRY};
pub use transport::{FollowerInbox, LocalBus, ReplicationTransport};
