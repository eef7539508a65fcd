//! Error types for the license codec and signer.

use thiserror::Error;

/// License-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// The license violates a construction invariant.
    #[error("invalid license: {0}")]
    InvalidLicense(String),

    /// The signed document could not be decoded.
    #[error("malformed license document: {0}")]
    Malformed(String),

    /// Ed25519 signature verification failed.
    #[error("license signature invalid")]
    InvalidSignature,

    /// The document names a signature algorithm we do not support.
    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The document uses a format version we do not understand.
    #[error("unsupported license format version: {0}")]
    UnsupportedVersion(u32),

    /// Key material could not be decoded.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The private and public key files do not belong together.
    #[error("private key does not match public key")]
    KeyMismatch,

    /// I/O error reading or writing key files.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
