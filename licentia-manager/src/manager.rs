//! The per-node license manager.
//!
//! [`LicensesManager`] owns the node's feature state. It is driven by exactly
//! two triggers, a registry change and the deadline timer, both funnelled
//! through [`LicensesManager::apply`] by the node's event loop. Readers never
//! touch the manager; they read [`FeatureSnapshot`]s from a watch channel.

use crate::evaluation::{evaluate, Evaluation};
use crate::notify::{FeatureEvent, FeatureStatus};
use licentia_license::{LicenseVerifier, SignedLicense};
use licentia_registry::CommittedState;
use licentia_types::{LicenseUid, NodeId, Timestamp};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// What caused a re-evaluation.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// The node observed a new registry version.
    RegistryChanged(CommittedState),
    /// The deadline timer fired.
    Timer,
}

/// A consistent, non-blocking view of a node's feature state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSnapshot {
    /// Incremented on every evaluation that changed at least one feature.
    pub generation: u64,
    /// Registry version the snapshot was computed from.
    pub version: u64,
    /// Currently enabled features.
    pub enabled: BTreeSet<String>,
    /// Lifecycle status of every feature seen on this node.
    pub statuses: BTreeMap<String, FeatureStatus>,
    /// The license in effect, if any.
    pub license_uid: Option<LicenseUid>,
    /// When the next timer-driven re-evaluation is due.
    pub next_deadline: Option<Timestamp>,
    /// When this snapshot was computed.
    pub evaluated_at: Timestamp,
}

impl FeatureSnapshot {
    fn initial(now: Timestamp) -> Self {
        Self {
            generation: 0,
            version: 0,
            enabled: BTreeSet::new(),
            statuses: BTreeMap::new(),
            license_uid: None,
            next_deadline: None,
            evaluated_at: now,
        }
    }

    /// Returns true if `feature` is enabled.
    #[must_use]
    pub fn is_enabled(&self, feature: &str) -> bool {
        self.enabled.contains(feature)
    }

    /// Returns the lifecycle status of `feature`.
    #[must_use]
    pub fn status(&self, feature: &str) -> FeatureStatus {
        self.statuses
            .get(feature)
            .copied()
            .unwrap_or(FeatureStatus::Unlicensed)
    }
}

/// Cached signature verdict for one license uid.
struct Verified {
    signature: Vec<u8>,
    valid: bool,
}

/// Single-writer feature state of one node.
pub struct LicensesManager {
    node_id: NodeId,
    verifier: LicenseVerifier,
    verified: HashMap<LicenseUid, Verified>,
    committed: CommittedState,
    signature_valid: bool,
    statuses: BTreeMap<String, FeatureStatus>,
    generation: u64,
    /// License uid for which the node-limit warning was already logged.
    node_limit_warned: Option<LicenseUid>,
    snapshot_tx: watch::Sender<FeatureSnapshot>,
    events_tx: broadcast::Sender<FeatureEvent>,
}

impl LicensesManager {
    /// Creates a manager with nothing observed yet.
    pub fn new(
        node_id: NodeId,
        verifier: LicenseVerifier,
        events_capacity: usize,
        now: Timestamp,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(FeatureSnapshot::initial(now));
        let (events_tx, _) = broadcast::channel(events_capacity.max(1));
        Self {
            node_id,
            verifier,
            verified: HashMap::new(),
            committed: CommittedState::initial(),
            signature_valid: false,
            statuses: BTreeMap::new(),
            generation: 0,
            node_limit_warned: None,
            snapshot_tx,
            events_tx,
        }
    }

    /// Returns a snapshot receiver.
    pub fn snapshots(&self) -> watch::Receiver<FeatureSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Returns the sending side of the event topic, for subscribing.
    pub fn events(&self) -> broadcast::Sender<FeatureEvent> {
        self.events_tx.clone()
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> FeatureSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Returns the currently enabled features.
    pub fn enabled_features(&self) -> BTreeSet<String> {
        self.snapshot_tx.borrow().enabled.clone()
    }

    /// Returns the registry version last applied.
    pub fn observed_version(&self) -> u64 {
        self.committed.version
    }

    /// Returns the next instant at which a timer trigger is needed.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.snapshot_tx.borrow().next_deadline
    }

    /// The single state-transition function.
    ///
    /// Re-evaluates the feature set at `now`, publishes a new snapshot and
    /// then one event per real transition. Returns the events published.
    pub fn apply(&mut self, trigger: Trigger, now: Timestamp) -> Vec<FeatureEvent> {
        if let Trigger::RegistryChanged(committed) = trigger {
            debug!(
                "Node {} applying registry version {}",
                self.node_id, committed.version
            );
            self.signature_valid = match committed.active_license() {
                Some(signed) => self.verify_cached(signed),
                None => false,
            };
            self.committed = committed;
        }

        let evaluation = evaluate(&self.committed.state, self.signature_valid, now);
        let events = self.transition(&evaluation, now);

        self.snapshot_tx.send_replace(FeatureSnapshot {
            generation: self.generation,
            version: self.committed.version,
            enabled: evaluation.enabled,
            statuses: self.statuses.clone(),
            license_uid: evaluation.license_uid,
            next_deadline: evaluation.next_deadline,
            evaluated_at: now,
        });

        for event in &events {
            info!(
                "Node {}: feature '{}' {} (generation {})",
                self.node_id, event.feature, event.status, event.generation
            );
            // No receivers is fine: nobody has subscribed yet.
            let _ = self.events_tx.send(event.clone());
        }
        events
    }

    /// Logs a warning when the cluster holds more nodes than the active
    /// license allows. The limit is informational and not enforced.
    pub fn note_cluster_size(&mut self, nodes: usize) {
        let Some(signed) = self.committed.active_license() else {
            return;
        };
        let license = signed.license();
        let limit = license.max_nodes() as usize;
        if nodes > limit && self.node_limit_warned != Some(license.uid()) {
            warn!(
                "Cluster has {} nodes but license {} allows {}",
                nodes,
                license.uid(),
                limit
            );
            self.node_limit_warned = Some(license.uid());
        }
    }

    fn verify_cached(&mut self, signed: &SignedLicense) -> bool {
        if let Some(entry) = self.verified.get(&signed.uid()) {
            if entry.signature == signed.signature() {
                return entry.valid;
            }
        }

        let valid = match self.verifier.check(signed) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Node {} rejecting license {}: {}",
                    self.node_id,
                    signed.uid(),
                    e
                );
                false
            }
        };
        self.verified.insert(
            signed.uid(),
            Verified {
                signature: signed.signature().to_vec(),
                valid,
            },
        );
        valid
    }

    /// Updates the per-feature state machine and returns the transitions.
    fn transition(&mut self, evaluation: &Evaluation, now: Timestamp) -> Vec<FeatureEvent> {
        let mut changed: Vec<(String, FeatureStatus)> = Vec::new();

        for (feature, status) in self.statuses.iter_mut() {
            if status.is_enabled() && !evaluation.enabled.contains(feature) {
                *status = FeatureStatus::Disabled;
                changed.push((feature.clone(), FeatureStatus::Disabled));
            }
        }
        for feature in &evaluation.enabled {
            let status = self
                .statuses
                .entry(feature.clone())
                .or_insert(FeatureStatus::Unlicensed);
            if !status.is_enabled() {
                *status = FeatureStatus::Enabled;
                changed.push((feature.clone(), FeatureStatus::Enabled));
            }
        }
        // A license seen but not valid still moves its feature out of
        // Unlicensed, silently.
        if let Some(signed) = self.committed.active_license() {
            if self.signature_valid {
                self.statuses
                    .entry(signed.license().feature().to_string())
                    .or_insert(FeatureStatus::Disabled);
            }
        }

        if changed.is_empty() {
            return Vec::new();
        }
        self.generation += 1;
        changed
            .into_iter()
            .map(|(feature, status)| FeatureEvent {
                feature,
                status,
                generation: self.generation,
                license_uid: evaluation.license_uid,
                at: now,
            })
            .collect()
    }
}

impl std::fmt::Debug for LicensesManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicensesManager")
            .field("node_id", &self.node_id)
            .field("version", &self.committed.version)
            .field("generation", &self.generation)
            .field("statuses", &self.statuses)
            .finish_non_exhaustive()
    }
}
