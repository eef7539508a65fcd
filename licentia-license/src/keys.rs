//! Ed25519 key generation and key file encoding.
//!
//! Key files hold the raw 32-byte key as standard base64 on a single line.

use crate::error::{LicenseError, LicenseResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::fs;
use std::path::Path;

/// Generates a fresh random signing key.
#[must_use]
pub fn generate_signing_key() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

/// Encodes a signing key as base64.
#[must_use]
pub fn encode_signing_key(key: &SigningKey) -> String {
    BASE64.encode(key.to_bytes())
}

/// Encodes a verifying key as base64.
#[must_use]
pub fn encode_verifying_key(key: &VerifyingKey) -> String {
    BASE64.encode(key.to_bytes())
}

/// Decodes a base64 signing key.
///
/// # Errors
///
/// Returns [`LicenseError::InvalidKey`] if the input is not 32 bytes of base64.
pub fn decode_signing_key(encoded: &str) -> LicenseResult<SigningKey> {
    let bytes = decode_key_bytes(encoded)?;
    Ok(SigningKey::from_bytes(&bytes))
}

/// Decodes a base64 verifying key.
///
/// # Errors
///
/// Returns [`LicenseError::InvalidKey`] if the input is not a valid
/// base64-encoded Ed25519 public key.
pub fn decode_verifying_key(encoded: &str) -> LicenseResult<VerifyingKey> {
    let bytes = decode_key_bytes(encoded)?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|_| LicenseError::InvalidKey("invalid public key".to_string()))
}

fn decode_key_bytes(encoded: &str) -> LicenseResult<[u8; 32]> {
    let raw = BASE64
        .decode(encoded.trim())
        .map_err(|e| LicenseError::InvalidKey(format!("invalid key base64: {e}")))?;
    raw.as_slice().try_into().map_err(|_| {
        LicenseError::InvalidKey(format!("expected 32 key bytes, got {}", raw.len()))
    })
}

/// Reads a signing key file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read, or
/// [`LicenseError::InvalidKey`] if its contents do not decode.
pub fn read_signing_key(path: impl AsRef<Path>) -> LicenseResult<SigningKey> {
    decode_signing_key(&fs::read_to_string(path)?)
}

/// Reads a verifying key file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read, or
/// [`LicenseError::InvalidKey`] if its contents do not decode.
pub fn read_verifying_key(path: impl AsRef<Path>) -> LicenseResult<VerifyingKey> {
    decode_verifying_key(&fs::read_to_string(path)?)
}

/// Writes a signing key file, readable only by the owner on Unix.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be written.
pub fn write_signing_key(path: impl AsRef<Path>, key: &SigningKey) -> LicenseResult<()> {
    let path = path.as_ref();
    fs::write(path, format!("{}\n", encode_signing_key(key)))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// Writes a verifying key file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be written.
pub fn write_verifying_key(path: impl AsRef<Path>, key: &VerifyingKey) -> LicenseResult<()> {
    fs::write(path, format!("{}\n", encode_verifying_key(key)))?;
    Ok(())
}
