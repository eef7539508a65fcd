//! Registry state and committed versions.
//!
//! The registry holds at most one active license. The state is treated as an
//! opaque snapshot by the replication layer: every committed version carries
//! the full state, so a follower never has to apply deltas.

use crate::error::{RegistryError, RegistryResult};
use licentia_license::SignedLicense;
use licentia_types::LicenseUid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The licensing entry of the cluster configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicensesMetadata {
    /// The currently active license.
    active: SignedLicense,
    /// Every uid installed since the last wipe, including the active one.
    installed_uids: BTreeSet<LicenseUid>,
}

impl LicensesMetadata {
    /// Returns the active license.
    pub fn active(&self) -> &SignedLicense {
        &self.active
    }

    /// Returns the uids installed since the last wipe.
    pub fn installed_uids(&self) -> &BTreeSet<LicenseUid> {
        &self.installed_uids
    }
}

/// Zero-or-one active license. Absent means wiped (or never installed).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistryState(Option<LicensesMetadata>);

impl RegistryState {
    /// The wiped state.
    #[must_use]
    pub fn absent() -> Self {
        Self(None)
    }

    /// A fresh state holding only `license`.
    #[must_use]
    pub fn with_license(license: SignedLicense) -> Self {
        let installed_uids = BTreeSet::from([license.uid()]);
        Self(Some(LicensesMetadata {
            active: license,
            installed_uids,
        }))
    }

    /// Returns true if no license is installed.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.0.is_none()
    }

    /// Returns the licensing metadata, if any.
    #[must_use]
    pub fn metadata(&self) -> Option<&LicensesMetadata> {
        self.0.as_ref()
    }

    /// Returns the active license, if any.
    #[must_use]
    pub fn active_license(&self) -> Option<&SignedLicense> {
        self.0.as_ref().map(|m| &m.active)
    }

    /// Returns a state in which `license` supersedes the active one.
    ///
    /// Re-installing the exact active license yields an identical state.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateUid`] if the uid was installed before
    /// with different content, or superseded since.
    pub fn install(&self, license: SignedLicense) -> RegistryResult<Self> {
        match &self.0 {
            None => Ok(Self::with_license(license)),
            Some(metadata) => {
                if metadata.active == license {
                    return Ok(self.clone());
                }
                if metadata.installed_uids.contains(&license.uid()) {
                    return Err(RegistryError::DuplicateUid(license.uid()));
                }
                let mut installed_uids = metadata.installed_uids.clone();
                installed_uids.insert(license.uid());
                Ok(Self(Some(LicensesMetadata {
                    active: license,
                    installed_uids,
                })))
            }
        }
    }

    pub(crate) fn into_metadata(self) -> Option<LicensesMetadata> {
        self.0
    }

    pub(crate) fn from_metadata(metadata: Option<LicensesMetadata>) -> Self {
        Self(metadata)
    }
}

/// A registry state tagged with the version at which it was committed.
///
/// Version 0 is the initial absent state; each committed change increments
/// the version by exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedState {
    /// Commit sequence number.
    pub version: u64,
    /// The full registry state at this version.
    pub state: RegistryState,
}

impl CommittedState {
    /// The state before any commit.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            version: 0,
            state: RegistryState::absent(),
        }
    }

    /// Creates a committed state.
    #[must_use]
    pub fn new(version: u64, state: RegistryState) -> Self {
        Self { version, state }
    }

    /// Returns the active license at this version, if any.
    #[must_use]
    pub fn active_license(&self) -> Option<&SignedLicense> {
        self.state.active_license()
    }
}

impl Default for CommittedState {
    fn default() -> Self {
        Self::initial()
    }
}
