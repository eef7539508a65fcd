mod common;

use common::{make_license, other_signing_key, test_signing_key};
use licentia_license::{keys, LicenseError, LicenseSigner, LicenseVerifier};
use std::time::Duration;

#[test]
fn encode_decode_signing_key() {
    let key = test_signing_key();
    let decoded = keys::decode_signing_key(&keys::encode_signing_key(&key)).unwrap();
    assert_eq!(decoded.to_bytes(), key.to_bytes());
}

#[test]
fn decode_rejects_wrong_length() {
    let err = keys::decode_verifying_key("AAAA").unwrap_err();
    assert!(matches!(err, LicenseError::InvalidKey(_)));
}

#[test]
fn decode_rejects_bad_base64() {
    assert!(matches!(
        keys::decode_signing_key("%%%"),
        Err(LicenseError::InvalidKey(_))
    ));
}

#[test]
fn generated_keys_differ() {
    let a = keys::generate_signing_key();
    let b = keys::generate_signing_key();
    assert_ne!(a.to_bytes(), b.to_bytes());
}

#[test]
fn key_files_roundtrip_and_sign() {
    let dir = tempfile::tempdir().unwrap();
    let private_path = dir.path().join("private.key");
    let public_path = dir.path().join("public.key");

    let key = keys::generate_signing_key();
    keys::write_signing_key(&private_path, &key).unwrap();
    keys::write_verifying_key(&public_path, &key.verifying_key()).unwrap();

    let signer = LicenseSigner::from_key_files(&private_path, &public_path).unwrap();
    let signed = signer.sign(&make_license("shield", Duration::from_secs(60))).unwrap();

    let verifier = LicenseVerifier::from_key_file(&public_path).unwrap();
    assert!(verifier.verify(&signed));
}

#[cfg(unix)]
#[test]
fn private_key_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("private.key");
    keys::write_signing_key(&path, &test_signing_key()).unwrap();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn mismatched_key_files_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let private_path = dir.path().join("private.key");
    let public_path = dir.path().join("public.key");

    keys::write_signing_key(&private_path, &test_signing_key()).unwrap();
    keys::write_verifying_key(&public_path, &other_signing_key().verifying_key()).unwrap();

    let err = LicenseSigner::from_key_files(&private_path, &public_path).unwrap_err();
    assert!(matches!(err, LicenseError::KeyMismatch));
}

#[test]
fn missing_key_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = LicenseVerifier::from_key_file(dir.path().join("absent.key")).unwrap_err();
    assert!(matches!(err, LicenseError::Io(_)));
}
