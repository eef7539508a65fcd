//! Error types for the registry layer.

use licentia_types::LicenseUid;
use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur in registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The coordinator is stopped, crashed or otherwise unreachable.
    #[error("coordinator unavailable: {0}")]
    CoordinatorUnavailable(String),

    /// The new version could not be persisted; nothing was committed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The submitted mutation refused to produce a new state.
    #[error("update rejected: {0}")]
    Rejected(String),

    /// The license uid was already installed earlier in this registry's history.
    #[error("license uid {0} was already installed")]
    DuplicateUid(LicenseUid),

    /// Protocol error (invalid or incompatible message).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RegistryError {
    /// Returns true if resubmitting the same update may succeed.
    ///
    /// The registry never retries on its own; callers decide.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CoordinatorUnavailable(_) | Self::Persistence(_))
    }
}
