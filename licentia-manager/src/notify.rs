//! Consumer notification channel.
//!
//! The manager publishes a [`FeatureEvent`] on a broadcast topic for every
//! real transition. Each subscriber gets its own delivery task which:
//!
//! 1. Replays `on_enabled` for the features enabled in the current snapshot
//! 2. Forwards events newer than that snapshot, filtered by [`FeatureFilter`]
//! 3. Resynchronizes from the latest snapshot if it falls behind the topic
//!
//! Per subscriber and per feature, callbacks alternate strictly between
//! enabled and disabled. Consumers start out disabled.

use crate::manager::FeatureSnapshot;
use async_trait::async_trait;
use licentia_types::{LicenseUid, Timestamp};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Lifecycle status of one feature on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureStatus {
    /// Never granted by any license this node has seen.
    Unlicensed,
    /// Granted by the current, valid license.
    Enabled,
    /// Previously seen, not currently granted.
    Disabled,
}

impl FeatureStatus {
    /// Returns true for [`FeatureStatus::Enabled`].
    #[must_use]
    pub fn is_enabled(self) -> bool {
        self == Self::Enabled
    }
}

impl fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlicensed => write!(f, "unlicensed"),
            Self::Enabled => write!(f, "enabled"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// A feature transition published by a node's manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureEvent {
    /// The feature that changed.
    pub feature: String,
    /// Its new status (`Enabled` or `Disabled`).
    pub status: FeatureStatus,
    /// Generation of the snapshot that contains this transition.
    pub generation: u64,
    /// The license in effect when the transition happened.
    pub license_uid: Option<LicenseUid>,
    /// Evaluation time of the transition.
    pub at: Timestamp,
}

/// Receives feature transitions.
#[async_trait]
pub trait FeatureListener: Send + Sync + 'static {
    /// Called when `feature` becomes enabled.
    async fn on_enabled(&self, feature: &str);

    /// Called when `feature` stops being enabled.
    async fn on_disabled(&self, feature: &str);
}

/// Which features a subscriber is interested in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FeatureFilter {
    /// Every feature.
    #[default]
    All,
    /// Only the named features.
    Only(BTreeSet<String>),
}

impl FeatureFilter {
    /// A filter for a single feature.
    pub fn feature(name: impl Into<String>) -> Self {
        Self::Only(BTreeSet::from([name.into()]))
    }

    /// Returns true if events for `feature` pass the filter.
    #[must_use]
    pub fn matches(&self, feature: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(features) => features.contains(feature),
        }
    }
}

/// A live subscription. Delivery stops when it is dropped.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stops delivery.
    pub fn unsubscribe(self) {}

    /// Returns true while the delivery task is running.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Starts a delivery task. `events` must have been subscribed before the
/// snapshot is read so no transition falls between the two.
pub(crate) fn spawn_delivery(
    listener: Arc<dyn FeatureListener>,
    filter: FeatureFilter,
    events: broadcast::Receiver<FeatureEvent>,
    snapshots: watch::Receiver<FeatureSnapshot>,
) -> Subscription {
    let delivery = Delivery {
        listener,
        filter,
        delivered: BTreeMap::new(),
    };
    Subscription {
        task: tokio::spawn(delivery.run(events, snapshots)),
    }
}

/// Per-subscriber delivery state.
struct Delivery {
    listener: Arc<dyn FeatureListener>,
    filter: FeatureFilter,
    /// Last status delivered per feature; missing means disabled.
    delivered: BTreeMap<String, FeatureStatus>,
}

impl Delivery {
    async fn run(
        mut self,
        mut events: broadcast::Receiver<FeatureEvent>,
        snapshots: watch::Receiver<FeatureSnapshot>,
    ) {
        let initial = snapshots.borrow().clone();
        let mut baseline = self.resync(&initial).await;

        loop {
            match events.recv().await {
                Ok(event) => {
                    if event.generation <= baseline || !self.filter.matches(&event.feature) {
                        continue;
                    }
                    self.deliver(&event.feature, event.status).await;
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Subscriber lagged by {} events, resyncing", missed);
                    let latest = snapshots.borrow().clone();
                    baseline = self.resync(&latest).await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Feature topic closed, ending delivery");
                    break;
                }
            }
        }
    }

    /// Brings the subscriber in line with `snapshot` and returns its generation.
    async fn resync(&mut self, snapshot: &FeatureSnapshot) -> u64 {
        let lost: Vec<String> = self
            .delivered
            .iter()
            .filter(|(feature, status)| status.is_enabled() && !snapshot.enabled.contains(*feature))
            .map(|(feature, _)| feature.clone())
            .collect();
        for feature in lost {
            self.deliver(&feature, FeatureStatus::Disabled).await;
        }

        for feature in &snapshot.enabled {
            if self.filter.matches(feature) {
                self.deliver(feature, FeatureStatus::Enabled).await;
            }
        }
        snapshot.generation
    }

    async fn deliver(&mut self, feature: &str, status: FeatureStatus) {
        let previous = self
            .delivered
            .get(feature)
            .copied()
            .unwrap_or(FeatureStatus::Disabled);
        if previous.is_enabled() == status.is_enabled() {
            return;
        }
        if status.is_enabled() {
            self.listener.on_enabled(feature).await;
        } else {
            self.listener.on_disabled(feature).await;
        }
        self.delivered.insert(feature.to_string(), status);
    }
}
