//! Error types for the manager layer.

use crate::notify::FeatureStatus;
use licentia_license::LicenseError;
use licentia_registry::RegistryError;
use licentia_types::NodeId;
use std::time::Duration;
use thiserror::Error;

/// Result type for manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Errors that can occur in manager, admin and cluster operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The license document or its signature was rejected.
    #[error("license rejected: {0}")]
    License(#[from] LicenseError),

    /// The registry refused or failed the update.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Not every node reached the expected status in time. The submitted
    /// update is not retracted.
    #[error("feature '{feature}' did not converge to {expected} within {waited:?}")]
    ConvergenceTimeout {
        feature: String,
        expected: FeatureStatus,
        waited: Duration,
    },

    /// The node's event loop is no longer running.
    #[error("node {0} is stopped")]
    NodeStopped(NodeId),

    /// No such node in the cluster.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
}

impl ManagerError {
    /// Returns true if repeating the operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Registry(e) => e.is_retryable(),
            Self::ConvergenceTimeout { .. } => true,
            _ => false,
        }
    }
}
