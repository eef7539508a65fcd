//! Administrative operations: install and wipe.

use crate::clock::Clock;
use crate::error::ManagerResult;
use licentia_license::{LicenseVerifier, SignedLicense};
use licentia_registry::{CoordinatorHandle, UpdateAck};
use std::sync::Arc;
use tracing::{info, warn};

/// Submits license changes to the registry coordinator.
///
/// Documents and signatures are checked here, before submission, so a
/// rejected install never reaches the registry.
#[derive(Clone)]
pub struct LicenseAdmin {
    coordinator: CoordinatorHandle,
    verifier: LicenseVerifier,
    clock: Arc<dyn Clock>,
}

impl LicenseAdmin {
    /// Creates an admin bound to a coordinator.
    pub fn new(
        coordinator: CoordinatorHandle,
        verifier: LicenseVerifier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            coordinator,
            verifier,
            clock,
        }
    }

    /// Decodes, verifies and installs a signed license document.
    ///
    /// # Errors
    ///
    /// Fails with a license error for malformed or badly signed documents,
    /// and with a registry error if the coordinator refuses or fails the update.
    pub async fn install(&self, document: &str) -> ManagerResult<UpdateAck> {
        let signed = self.verifier.decode_and_verify(document)?;
        self.install_license(signed).await
    }

    /// Verifies and installs an already decoded license.
    ///
    /// Installing the active license again is a no-op; reusing any other
    /// uid installed since the last wipe fails with `DuplicateUid`. An
    /// already expired license is accepted and enables nothing.
    pub async fn install_license(&self, signed: SignedLicense) -> ManagerResult<UpdateAck> {
        self.verifier.check(&signed)?;

        let license = signed.license();
        if license.is_expired_at(self.clock.now()) {
            warn!(
                "Installing license {} which expired at {}",
                license.uid(),
                license.expiry_date()
            );
        }

        let description = format!("install license {} ({})", license.uid(), license.feature());
        let ack = self
            .coordinator
            .submit_update(description, move |state| state.install(signed))
            .await?;
        info!(
            "Install acknowledged at version {} (changed: {})",
            ack.version, ack.changed
        );
        Ok(ack)
    }

    /// Removes the active license.
    pub async fn wipe(&self) -> ManagerResult<UpdateAck> {
        let ack = self.coordinator.wipe().await?;
        info!(
            "Wipe acknowledged at version {} (changed: {})",
            ack.version, ack.changed
        );
        Ok(ack)
    }

    /// The coordinator this admin submits to.
    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }
}

impl std::fmt::Debug for LicenseAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseAdmin")
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}
