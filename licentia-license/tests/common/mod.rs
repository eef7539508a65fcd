//! Shared test helpers for license tests.

#![allow(dead_code)]

use ed25519_dalek::SigningKey;
use licentia_license::{License, LicenseSigner, SignedLicense};
use licentia_types::Timestamp;
use std::time::Duration;

/// Returns a deterministic Ed25519 signing key from a fixed seed.
pub fn test_signing_key() -> SigningKey {
    let seed: [u8; 32] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ];
    SigningKey::from_bytes(&seed)
}

/// Returns a second, unrelated signing key.
pub fn other_signing_key() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
}

/// Returns a signer over the deterministic test key.
pub fn test_signer() -> LicenseSigner {
    LicenseSigner::new(test_signing_key())
}

/// Builds a license for `feature` valid from now for `valid_for`.
pub fn make_license(feature: &str, valid_for: Duration) -> License {
    let now = Timestamp::now();
    License::builder()
        .feature(feature)
        .issuer("licentia")
        .issued_to("customer")
        .license_type("subscription")
        .subscription_type("gold")
        .issue_date(now)
        .expiry_date(now.saturating_add(valid_for))
        .max_nodes(5)
        .build()
        .unwrap()
}

/// Signs a one-hour license for `feature` with the test key.
pub fn make_signed(feature: &str) -> SignedLicense {
    test_signer()
        .sign(&make_license(feature, Duration::from_secs(3600)))
        .unwrap()
}

/// Rewrites one field of an envelope document's JSON.
pub fn tamper(document: &str, edit: impl FnOnce(&mut serde_json::Value)) -> String {
    let mut value: serde_json::Value = serde_json::from_str(document).unwrap();
    edit(&mut value);
    serde_json::to_string(&value).unwrap()
}
