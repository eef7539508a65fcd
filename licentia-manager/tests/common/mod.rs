//! Shared test helpers for manager tests.

#![allow(dead_code)]

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use licentia_license::{License, LicenseSigner, SignedLicense};
use licentia_manager::{Clock, FeatureListener};
use licentia_registry::{CommittedState, RegistryState};
use licentia_types::Timestamp;
use std::sync::Mutex;
use std::time::Duration;

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Returns a signer over a deterministic Ed25519 key.
pub fn test_signer() -> LicenseSigner {
    let seed: [u8; 32] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ];
    LicenseSigner::new(SigningKey::from_bytes(&seed))
}

/// Returns a signer over an unrelated key.
pub fn rogue_signer() -> LicenseSigner {
    LicenseSigner::new(SigningKey::from_bytes(&[7u8; 32]))
}

/// Builds a license for `feature` valid over `[issue, expiry]`.
pub fn license(feature: &str, issue: Timestamp, expiry: Timestamp) -> License {
    License::builder()
        .feature(feature)
        .issuer("licentia")
        .issued_to("customer")
        .subscription_type("gold")
        .issue_date(issue)
        .expiry_date(expiry)
        .max_nodes(5)
        .build()
        .unwrap()
}

/// Signs a license for `feature` valid over `[issue, expiry]`.
pub fn signed_between(feature: &str, issue: Timestamp, expiry: Timestamp) -> SignedLicense {
    test_signer().sign(&license(feature, issue, expiry)).unwrap()
}

/// Signs a license for `feature` issued at `now` and valid for `valid_for`.
pub fn signed_for(feature: &str, now: Timestamp, valid_for: Duration) -> SignedLicense {
    signed_between(feature, now, now.saturating_add(valid_for))
}

/// A committed state at `version` holding `license`.
pub fn committed(version: u64, license: SignedLicense) -> CommittedState {
    CommittedState::new(version, RegistryState::with_license(license))
}

/// A committed wiped state at `version`.
pub fn wiped(version: u64) -> CommittedState {
    CommittedState::new(version, RegistryState::absent())
}

/// A clock that follows tokio's (possibly paused) time.
pub struct TokioClock {
    base: Timestamp,
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            base: Timestamp::now(),
            start: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        self.base.saturating_add(self.start.elapsed())
    }
}

/// One listener callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Enabled(String),
    Disabled(String),
}

/// Records every callback it receives.
#[derive(Default)]
pub struct RecordingListener {
    calls: Mutex<Vec<Call>>,
}

impl RecordingListener {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl FeatureListener for RecordingListener {
    async fn on_enabled(&self, feature: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Enabled(feature.to_string()));
    }

    async fn on_disabled(&self, feature: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Disabled(feature.to_string()));
    }
}

/// Polls `condition` every few milliseconds until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
