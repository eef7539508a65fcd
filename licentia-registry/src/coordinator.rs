//! The registry coordinator: serialized admission and background dissemination.
//!
//! A coordinator owns the authoritative [`CommittedState`]. Submissions travel
//! over a bounded command channel to a single admission task, which applies
//! them one at a time, persists the result and acknowledges the submitter.
//! Committed versions are then handed to a dissemination task that publishes
//! them to followers in commit order.

use crate::error::{RegistryError, RegistryResult};
use crate::protocol::ReplicationMessage;
use crate::state::{CommittedState, RegistryState};
use crate::store::RegistryStore;
use crate::transport::ReplicationTransport;
use licentia_types::NodeId;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A state transition submitted to the coordinator.
pub type Mutation = Box<dyn FnOnce(&RegistryState) -> RegistryResult<RegistryState> + Send>;

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Identity of the node hosting the coordinator.
    pub node_id: NodeId,
    /// Capacity of the admission queue. Submitters wait when it is full.
    pub queue_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::new(),
            queue_capacity: 64,
        }
    }
}

/// Acknowledgement of a submitted update, sent once the coordinator has
/// committed locally. Followers may not have observed it yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateAck {
    /// The committed version after this update.
    pub version: u64,
    /// The description given at submission.
    pub description: String,
    /// False if the mutation left the state unchanged (no new version).
    pub changed: bool,
}

/// Command sent to the admission loop.
enum AdmissionCommand {
    /// Apply a mutation to the latest committed state.
    Submit {
        description: String,
        mutate: Mutation,
        ack_tx: oneshot::Sender<RegistryResult<UpdateAck>>,
    },
}

/// State owned by the admission task.
struct AdmissionLoop {
    node_id: NodeId,
    store: Arc<dyn RegistryStore>,
    committed_tx: watch::Sender<CommittedState>,
    disseminate_tx: mpsc::UnboundedSender<CommittedState>,
}

impl AdmissionLoop {
    /// Admits commands until shutdown is signalled or every handle is gone.
    ///
    /// The stop signal is only observed between commands: an update whose
    /// persist has started always runs to its commit or its failure, so the
    /// submitter's ack matches what the store holds.
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<AdmissionCommand>,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        let mut stop_dropped = false;
        loop {
            let command = tokio::select! {
                biased;
                stop = &mut stop_rx, if !stop_dropped => match stop {
                    Ok(()) => break,
                    Err(_) => {
                        stop_dropped = true;
                        continue;
                    }
                },
                command = command_rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            match command {
                AdmissionCommand::Submit {
                    description,
                    mutate,
                    ack_tx,
                } => {
                    let result = self.admit(&description, mutate).await;
                    if let Err(e) = &result {
                        debug!("Update '{}' not committed: {}", description, e);
                    }
                    if ack_tx.send(result).is_err() {
                        debug!("Submitter of '{}' went away before the ack", description);
                    }
                }
            }
        }

        command_rx.close();
        let mut refused = 0;
        while let Ok(AdmissionCommand::Submit { ack_tx, .. }) = command_rx.try_recv() {
            let _ = ack_tx.send(Err(RegistryError::CoordinatorUnavailable(format!(
                "coordinator on {} stopped before admitting the update",
                self.node_id
            ))));
            refused += 1;
        }
        debug!(
            "Admission loop on {} finished ({} queued updates refused)",
            self.node_id, refused
        );
    }

    async fn admit(&mut self, description: &str, mutate: Mutation) -> RegistryResult<UpdateAck> {
        let current = self.committed_tx.borrow().clone();

        // Only unwinding panics are caught; release builds abort instead.
        let next_state = std::panic::catch_unwind(AssertUnwindSafe(|| mutate(&current.state)))
            .map_err(|_| RegistryError::Rejected(format!("mutation '{description}' panicked")))??;

        if next_state == current.state {
            return Ok(UpdateAck {
                version: current.version,
                description: description.to_string(),
                changed: false,
            });
        }

        let next = CommittedState::new(current.version + 1, next_state);
        let store = Arc::clone(&self.store);
        let to_persist = next.clone();
        tokio::task::spawn_blocking(move || store.persist(&to_persist))
            .await
            .map_err(|e| RegistryError::Persistence(format!("persist task failed: {e}")))??;

        self.committed_tx.send_replace(next.clone());
        info!("Committed registry version {} ({})", next.version, description);

        let version = next.version;
        if self.disseminate_tx.send(next).is_err() {
            warn!("Dissemination task gone; version {} not published", version);
        }

        Ok(UpdateAck {
            version,
            description: description.to_string(),
            changed: true,
        })
    }
}

/// Publishes committed versions to followers, one at a time, in commit order.
async fn run_dissemination(
    transport: Arc<dyn ReplicationTransport>,
    mut rx: mpsc::UnboundedReceiver<CommittedState>,
) {
    while let Some(committed) = rx.recv().await {
        let version = committed.version;
        match transport.publish(ReplicationMessage::Commit(committed)).await {
            Ok(reached) => debug!("Disseminated version {} to {} followers", version, reached),
            Err(e) => warn!("Failed to disseminate version {}: {}", version, e),
        }
    }
}

/// Cloneable submission handle for a running coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    node_id: NodeId,
    command_tx: mpsc::Sender<AdmissionCommand>,
    committed_rx: watch::Receiver<CommittedState>,
    running: Arc<AtomicBool>,
}

impl CoordinatorHandle {
    /// Submits an update and waits for the local commit.
    ///
    /// `mutate` is applied to the latest committed state. Returning an equal
    /// state is a no-op acknowledged with `changed == false`.
    ///
    /// # Errors
    ///
    /// - the error returned by `mutate`, or [`RegistryError::Rejected`] if it panicked
    /// - [`RegistryError::Persistence`] if the new version could not be stored
    /// - [`RegistryError::CoordinatorUnavailable`] if the coordinator is stopped
    ///   or stops before acknowledging
    pub async fn submit_update<F>(
        &self,
        description: impl Into<String>,
        mutate: F,
    ) -> RegistryResult<UpdateAck>
    where
        F: FnOnce(&RegistryState) -> RegistryResult<RegistryState> + Send + 'static,
    {
        if !self.is_running() {
            return Err(self.unavailable());
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        self.command_tx
            .send(AdmissionCommand::Submit {
                description: description.into(),
                mutate: Box::new(mutate),
                ack_tx,
            })
            .await
            .map_err(|_| self.unavailable())?;

        ack_rx.await.map_err(|_| self.unavailable())?
    }

    /// Removes the active license (installs "absent").
    pub async fn wipe(&self) -> RegistryResult<UpdateAck> {
        self.submit_update("wipe", |_| Ok(RegistryState::absent()))
            .await
    }

    /// Returns the latest committed state without waiting.
    pub fn latest(&self) -> CommittedState {
        self.committed_rx.borrow().clone()
    }

    /// The node hosting this coordinator.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Returns true until the coordinator is shut down.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn unavailable(&self) -> RegistryError {
        RegistryError::CoordinatorUnavailable(format!("coordinator on {} is stopped", self.node_id))
    }
}

impl std::fmt::Debug for CoordinatorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorHandle")
            .field("node_id", &self.node_id)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// A running registry coordinator.
pub struct Coordinator {
    handle: CoordinatorHandle,
    stop_tx: oneshot::Sender<()>,
    admission: JoinHandle<()>,
    dissemination: JoinHandle<()>,
}

impl Coordinator {
    /// Starts a coordinator over `store`, resuming from the last persisted
    /// version, and announces that version on `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Persistence`] if the store cannot be loaded.
    pub async fn start(
        config: CoordinatorConfig,
        store: Arc<dyn RegistryStore>,
        transport: Arc<dyn ReplicationTransport>,
    ) -> RegistryResult<Self> {
        let loader = Arc::clone(&store);
        let committed = tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(|e| RegistryError::Persistence(format!("load task failed: {e}")))??
            .unwrap_or_default();

        transport
            .publish(ReplicationMessage::Snapshot(committed.clone()))
            .await?;

        let (committed_tx, committed_rx) = watch::channel(committed.clone());
        let (command_tx, command_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (disseminate_tx, disseminate_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();

        let admission = tokio::spawn(
            AdmissionLoop {
                node_id: config.node_id,
                store,
                committed_tx,
                disseminate_tx,
            }
            .run(command_rx, stop_rx),
        );
        let dissemination = tokio::spawn(run_dissemination(transport, disseminate_rx));

        info!(
            "Registry coordinator started on {} at version {}",
            config.node_id, committed.version
        );

        Ok(Self {
            handle: CoordinatorHandle {
                node_id: config.node_id,
                command_tx,
                committed_rx,
                running: Arc::new(AtomicBool::new(true)),
            },
            stop_tx,
            admission,
            dissemination,
        })
    }

    /// Returns a submission handle.
    pub fn handle(&self) -> CoordinatorHandle {
        self.handle.clone()
    }

    /// The node hosting this coordinator.
    pub fn node_id(&self) -> NodeId {
        self.handle.node_id
    }

    /// Returns the latest committed state.
    pub fn latest(&self) -> CommittedState {
        self.handle.latest()
    }

    /// Stops admitting updates.
    ///
    /// An update already being admitted finishes first and its submitter gets
    /// the real outcome. Queued submissions fail with
    /// [`RegistryError::CoordinatorUnavailable`]. Versions already committed
    /// are still disseminated.
    pub async fn shutdown(self) {
        self.handle.running.store(false, Ordering::SeqCst);
        // The loop may already have exited on its own.
        let _ = self.stop_tx.send(());
        if let Err(e) = self.admission.await {
            warn!("Admission task on {} ended abnormally: {}", self.handle.node_id, e);
        }
        // The admission task owned the only dissemination sender, so this
        // finishes once the backlog is published.
        let _ = self.dissemination.await;
        info!("Registry coordinator on {} stopped", self.handle.node_id);
    }
}
