//! License records, canonical codec and signing for Licentia.
//!
//! This crate handles:
//! - Building and validating licenses (feature, validity window, node limit)
//! - Canonical byte production for signing
//! - Ed25519 signing and verification
//! - The self-describing signed license document (JSON envelope)
//! - Key file encoding for the offline licensor
//!
//! # Document Format
//!
//! A signed license document is a JSON object:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "algorithm": "ed25519",
//!   "license": { "uid": "...", "feature": "shield", ... },
//!   "signature": "<base64url, no padding>"
//! }
//! ```
//!
//! The signature covers the canonical bytes of every field except the
//! signature itself, including the format version and algorithm id.
//!
//! # Example
//!
//! ```
//! use licentia_license::{keys, License, LicenseSigner};
//! use licentia_types::Timestamp;
//! use std::time::Duration;
//!
//! let signer = LicenseSigner::new(keys::generate_signing_key());
//! let now = Timestamp::now();
//! let license = License::builder()
//!     .feature("shield")
//!     .issuer("licentia")
//!     .issued_to("customer")
//!     .issue_date(now)
//!     .expiry_date(now.saturating_add(Duration::from_secs(3600)))
//!     .max_nodes(5)
//!     .build()
//!     .unwrap();
//!
//! let signed = signer.sign(&license).unwrap();
//! assert!(signer.verifier().verify(&signed));
//! ```

mod codec;
mod error;
pub mod keys;
mod license;
mod signer;

pub use codec::{CanonicalBytes, SignedLicense, ALGORITHM_ED25519, FORMAT_VERSION};
pub use error::{LicenseError, LicenseResult};
pub use license::{License, LicenseBuilder, DEFAULT_LICENSE_TYPE, DEFAULT_SUBSCRIPTION_TYPE};
pub use signer::{LicenseSigner, LicenseVerifier};
