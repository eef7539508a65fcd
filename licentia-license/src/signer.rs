//! Ed25519 license signing and verification.

use crate::codec::{CanonicalBytes, SignedLicense, ALGORITHM_ED25519, FORMAT_VERSION, SIGNATURE_LEN};
use crate::error::{LicenseError, LicenseResult};
use crate::keys;
use crate::license::License;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use std::path::Path;
use tracing::debug;

/// Signs licenses with a private key. Used offline by the licensor.
pub struct LicenseSigner {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl LicenseSigner {
    /// Creates a signer from an Ed25519 signing key.
    #[must_use]
    pub fn new(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Loads a signer from a private key file and the public key file it
    /// is expected to pair with.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be read or decoded, or
    /// [`LicenseError::KeyMismatch`] if the keys do not form a pair.
    pub fn from_key_files(
        private_key_path: impl AsRef<Path>,
        public_key_path: impl AsRef<Path>,
    ) -> LicenseResult<Self> {
        let signing_key = keys::read_signing_key(private_key_path)?;
        let expected = keys::read_verifying_key(public_key_path)?;
        if signing_key.verifying_key() != expected {
            return Err(LicenseError::KeyMismatch);
        }
        Ok(Self::new(signing_key))
    }

    /// Signs a license.
    ///
    /// The license is re-validated, canonicalized and signed, and the produced
    /// signature is checked against the paired public key before returning.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::InvalidLicense`] if the license violates an invariant.
    pub fn sign(&self, license: &License) -> LicenseResult<SignedLicense> {
        license.validate()?;
        let canonical = CanonicalBytes::for_license(license, ALGORITHM_ED25519, FORMAT_VERSION)?;
        let signature = self.signing_key.sign(canonical.as_bytes());
        let signed = SignedLicense::new(
            license.clone(),
            ALGORITHM_ED25519,
            signature.to_bytes().to_vec(),
        );
        self.verifier().check(&signed)?;
        debug!("Signed license {} for feature {}", license.uid(), license.feature());
        Ok(signed)
    }

    /// Returns a verifier for this signer's public key.
    #[must_use]
    pub fn verifier(&self) -> LicenseVerifier {
        LicenseVerifier::new(self.verifying_key)
    }

    /// Returns the public half of the key pair.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.verifying_key
    }
}

impl std::fmt::Debug for LicenseSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseSigner")
            .field("signing_key", &"[REDACTED]")
            .field("verifying_key", &self.verifying_key)
            .finish()
    }
}

/// Verifies signed licenses against the trusted public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseVerifier {
    key: VerifyingKey,
}

impl LicenseVerifier {
    /// Creates a verifier for a public key.
    #[must_use]
    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Creates a verifier from raw public key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::InvalidKey`] if the bytes are not a valid
    /// Ed25519 point.
    pub fn from_bytes(bytes: &[u8; 32]) -> LicenseResult<Self> {
        let key = VerifyingKey::from_bytes(bytes)
            .map_err(|_| LicenseError::InvalidKey("invalid public key".to_string()))?;
        Ok(Self::new(key))
    }

    /// Loads a verifier from a public key file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn from_key_file(path: impl AsRef<Path>) -> LicenseResult<Self> {
        Ok(Self::new(keys::read_verifying_key(path)?))
    }

    /// Returns the trusted public key.
    #[must_use]
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.key
    }

    /// Checks the signature of a signed license.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::UnsupportedVersion`] or
    /// [`LicenseError::UnsupportedAlgorithm`] for envelopes we cannot check,
    /// [`LicenseError::Malformed`] for a signature of the wrong length and
    /// [`LicenseError::InvalidSignature`] if verification fails.
    pub fn check(&self, signed: &SignedLicense) -> LicenseResult<()> {
        if signed.format_version() != FORMAT_VERSION {
            return Err(LicenseError::UnsupportedVersion(signed.format_version()));
        }
        if signed.algorithm() != ALGORITHM_ED25519 {
            return Err(LicenseError::UnsupportedAlgorithm(signed.algorithm().to_string()));
        }
        if signed.signature().len() != SIGNATURE_LEN {
            return Err(LicenseError::Malformed("invalid signature length".to_string()));
        }
        let signature = Signature::from_slice(signed.signature())
            .map_err(|_| LicenseError::Malformed("invalid signature length".to_string()))?;

        let canonical = signed.canonical_bytes()?;
        self.key
            .verify(canonical.as_bytes(), &signature)
            .map_err(|_| LicenseError::InvalidSignature)
    }

    /// Returns true if the signed license verifies against the trusted key.
    #[must_use]
    pub fn verify(&self, signed: &SignedLicense) -> bool {
        self.check(signed).is_ok()
    }

    /// Decodes an envelope document and checks its signature.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Malformed`] on decode errors and
    /// [`LicenseError::InvalidSignature`] on signature mismatch.
    pub fn decode_and_verify(&self, document: &str) -> LicenseResult<SignedLicense> {
        let signed = SignedLicense::from_document(document)?;
        self.check(&signed)?;
        Ok(signed)
    }
}
