//! Canonical serialization and the signed license envelope.
//!
//! Signing input is produced exclusively through [`CanonicalBytes`]: a fixed
//! field order, integers only, dates as epoch milliseconds. The envelope is
//! the JSON document exchanged between the licensor and the cluster.

use crate::error::{LicenseError, LicenseResult};
use crate::license::License;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use licentia_types::{LicenseUid, Timestamp};
use serde::{Deserialize, Serialize};

/// Current envelope format version.
pub const FORMAT_VERSION: u32 = 1;

/// Algorithm id for Ed25519 signatures.
pub const ALGORITHM_ED25519: &str = "ed25519";

/// Ed25519 signature length in bytes.
pub(crate) const SIGNATURE_LEN: usize = 64;

/// Bytes covered by a license signature.
///
/// The inner buffer is private; the only constructor is
/// [`CanonicalBytes::for_license`], so every signature in the system is
/// computed over the same byte layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

/// Field layout of the signing input. Field order is the canonical order.
#[derive(Serialize)]
struct CanonicalLicense<'a> {
    format_version: u32,
    algorithm: &'a str,
    uid: LicenseUid,
    feature: &'a str,
    issuer: &'a str,
    issued_to: &'a str,
    #[serde(rename = "type")]
    license_type: &'a str,
    subscription_type: &'a str,
    issue_date: Timestamp,
    expiry_date: Timestamp,
    max_nodes: u32,
}

impl CanonicalBytes {
    /// Produces the canonical signing input for a license under the given
    /// envelope parameters.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if JSON encoding fails.
    pub fn for_license(
        license: &License,
        algorithm: &str,
        format_version: u32,
    ) -> LicenseResult<Self> {
        let canonical = CanonicalLicense {
            format_version,
            algorithm,
            uid: license.uid(),
            feature: license.feature(),
            issuer: license.issuer(),
            issued_to: license.issued_to(),
            license_type: license.license_type(),
            subscription_type: license.subscription_type(),
            issue_date: license.issue_date(),
            expiry_date: license.expiry_date(),
            max_nodes: license.max_nodes(),
        };
        Ok(Self(serde_json::to_vec(&canonical)?))
    }

    /// Access the canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A license together with its signature, algorithm id and format version.
///
/// Serializes to the envelope document. Equality is structural, so two
/// envelopes are equal only if they carry the same license and signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedLicense {
    format_version: u32,
    algorithm: String,
    license: License,
    #[serde(with = "signature_b64")]
    signature: Vec<u8>,
}

impl SignedLicense {
    pub(crate) fn new(license: License, algorithm: &str, signature: Vec<u8>) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            algorithm: algorithm.to_string(),
            license,
            signature,
        }
    }

    /// Decodes an envelope document.
    ///
    /// Only structure is checked here; the signature is checked by
    /// [`crate::LicenseVerifier`].
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Malformed`] if the document is not valid JSON,
    /// is missing fields, carries a license that violates its invariants, or
    /// has a signature of the wrong length.
    pub fn from_document(document: &str) -> LicenseResult<Self> {
        let signed: SignedLicense = serde_json::from_str(document.trim())
            .map_err(|e| LicenseError::Malformed(e.to_string()))?;
        signed
            .license
            .validate()
            .map_err(|e| LicenseError::Malformed(e.to_string()))?;
        if signed.signature.len() != SIGNATURE_LEN {
            return Err(LicenseError::Malformed(format!(
                "signature must be {SIGNATURE_LEN} bytes, got {}",
                signed.signature.len()
            )));
        }
        Ok(signed)
    }

    /// Encodes the envelope as a pretty-printed JSON document.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if JSON encoding fails.
    pub fn to_document(&self) -> LicenseResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Returns the license record.
    #[must_use]
    pub fn license(&self) -> &License {
        &self.license
    }

    /// Returns the license uid.
    #[must_use]
    pub fn uid(&self) -> LicenseUid {
        self.license.uid()
    }

    /// Returns the raw signature bytes.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Returns the signature algorithm id.
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Returns the envelope format version.
    #[must_use]
    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    /// Recomputes the canonical signing input for this envelope.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if JSON encoding fails.
    pub fn canonical_bytes(&self) -> LicenseResult<CanonicalBytes> {
        CanonicalBytes::for_license(&self.license, &self.algorithm, self.format_version)
    }
}

/// Serde adapter: signature bytes as unpadded base64url.
mod signature_b64 {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        URL_SAFE_NO_PAD
            .decode(encoded.as_bytes())
            .map_err(|e| serde::de::Error::custom(format!("invalid signature base64: {e}")))
    }
}
