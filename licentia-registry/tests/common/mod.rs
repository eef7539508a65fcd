//! Shared test helpers for registry tests.

#![allow(dead_code)]

use ed25519_dalek::SigningKey;
use licentia_license::{License, LicenseSigner, SignedLicense};
use licentia_registry::{
    CommittedState, Coordinator, CoordinatorConfig, LocalBus, MemoryStore, RegistryState,
};
use licentia_types::{LicenseUid, Timestamp};
use std::sync::Arc;
use std::time::Duration;

/// Returns a signer over a deterministic Ed25519 key.
pub fn test_signer() -> LicenseSigner {
    let seed: [u8; 32] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ];
    LicenseSigner::new(SigningKey::from_bytes(&seed))
}

/// Signs a one-hour license for `feature`.
pub fn signed(feature: &str) -> SignedLicense {
    signed_with_uid(feature, LicenseUid::new())
}

/// Signs a one-hour license for `feature` carrying a chosen uid.
pub fn signed_with_uid(feature: &str, uid: LicenseUid) -> SignedLicense {
    let now = Timestamp::now();
    let license = License::builder()
        .uid(uid)
        .feature(feature)
        .issuer("licentia")
        .issued_to("customer")
        .issue_date(now)
        .expiry_date(now.saturating_add(Duration::from_secs(3600)))
        .max_nodes(5)
        .build()
        .unwrap();
    test_signer().sign(&license).unwrap()
}

/// A committed state at `version` holding `feature`'s license.
pub fn committed(version: u64, feature: &str) -> CommittedState {
    CommittedState::new(version, RegistryState::with_license(signed(feature)))
}

/// A coordinator over a fresh memory store and bus.
pub struct Fixture {
    pub bus: Arc<LocalBus>,
    pub store: Arc<MemoryStore>,
    pub coordinator: Coordinator,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_bus(LocalBus::new()).await
    }

    pub async fn with_bus(bus: LocalBus) -> Self {
        let bus = Arc::new(bus);
        let store = Arc::new(MemoryStore::new());
        let coordinator = Coordinator::start(
            CoordinatorConfig::default(),
            store.clone(),
            bus.clone(),
        )
        .await
        .unwrap();
        Self {
            bus,
            store,
            coordinator,
        }
    }
}
