//! Offline licensor operations: key generation, signing and verification.
//!
//! The `licentia-licensor` binary is a thin clap front end over these
//! functions.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use licentia_license::{keys, License, LicenseSigner, LicenseVerifier, SignedLicense};
use licentia_types::Timestamp;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// File name of the generated private key.
pub const PRIVATE_KEY_FILE: &str = "licentia.key";
/// File name of the generated public key.
pub const PUBLIC_KEY_FILE: &str = "licentia.pub";

const MILLIS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

/// Locations of a generated key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPaths {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
}

/// Generates a key pair into `out_dir`. Existing keys are never overwritten.
pub fn keygen(out_dir: &Path) -> Result<KeyPaths> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    let paths = KeyPaths {
        private_key: out_dir.join(PRIVATE_KEY_FILE),
        public_key: out_dir.join(PUBLIC_KEY_FILE),
    };
    for path in [&paths.private_key, &paths.public_key] {
        if path.exists() {
            bail!("Refusing to overwrite existing key {}", path.display());
        }
    }

    let signing_key = keys::generate_signing_key();
    keys::write_signing_key(&paths.private_key, &signing_key)
        .context("Failed to write private key")?;
    keys::write_verifying_key(&paths.public_key, &signing_key.verifying_key())
        .context("Failed to write public key")?;
    info!("Generated key pair in {}", out_dir.display());
    Ok(paths)
}

/// How long a new license lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// A number of days from the issue date.
    Days(u32),
    /// Until an explicit instant.
    Until(Timestamp),
}

/// Everything needed to sign one license.
#[derive(Debug, Clone)]
pub struct SignRequest {
    pub feature: String,
    pub issued_to: String,
    pub issuer: String,
    pub license_type: String,
    pub subscription_type: String,
    pub validity: Validity,
    pub max_nodes: u32,
    pub private_key: PathBuf,
    pub public_key: PathBuf,
}

/// Signs a license issued at `now` and returns its envelope document.
pub fn sign(request: &SignRequest, now: Timestamp) -> Result<String> {
    let expiry = match request.validity {
        Validity::Days(days) => {
            now.saturating_add(Duration::from_millis(u64::from(days) * MILLIS_PER_DAY))
        }
        Validity::Until(at) => at,
    };

    let license = License::builder()
        .feature(&request.feature)
        .issuer(&request.issuer)
        .issued_to(&request.issued_to)
        .license_type(&request.license_type)
        .subscription_type(&request.subscription_type)
        .issue_date(now)
        .expiry_date(expiry)
        .max_nodes(request.max_nodes)
        .build()
        .context("Invalid license fields")?;

    let signer = LicenseSigner::from_key_files(&request.private_key, &request.public_key)
        .context("Failed to load signing keys")?;
    let signed = signer.sign(&license).context("Failed to sign license")?;
    debug!("Signed license {} for '{}'", signed.uid(), request.feature);
    Ok(signed.to_document()?)
}

/// Summary of a verified license.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub uid: String,
    pub feature: String,
    pub issued_to: String,
    pub issue_date: String,
    pub expiry_date: String,
    pub max_nodes: u32,
    pub expired: bool,
}

impl VerifyReport {
    fn new(signed: &SignedLicense, now: Timestamp) -> Self {
        let license = signed.license();
        Self {
            uid: license.uid().to_string(),
            feature: license.feature().to_string(),
            issued_to: license.issued_to().to_string(),
            issue_date: format_timestamp(license.issue_date()),
            expiry_date: format_timestamp(license.expiry_date()),
            max_nodes: license.max_nodes(),
            expired: license.is_expired_at(now),
        }
    }
}

impl std::fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "uid:        {}", self.uid)?;
        writeln!(f, "feature:    {}", self.feature)?;
        writeln!(f, "issued to:  {}", self.issued_to)?;
        writeln!(f, "issued:     {}", self.issue_date)?;
        writeln!(f, "expires:    {}", self.expiry_date)?;
        writeln!(f, "max nodes:  {}", self.max_nodes)?;
        write!(f, "status:     {}", if self.expired { "expired" } else { "valid" })
    }
}

/// Verifies a license document against a public key file.
pub fn verify(document: &str, public_key: &Path, now: Timestamp) -> Result<VerifyReport> {
    let verifier = LicenseVerifier::from_key_file(public_key)
        .with_context(|| format!("Failed to load public key {}", public_key.display()))?;
    let signed = verifier
        .decode_and_verify(document)
        .context("License verification failed")?;
    Ok(VerifyReport::new(&signed, now))
}

/// Parses an expiry date given as RFC 3339 or as `YYYY-MM-DD`, the latter
/// meaning the last millisecond of that day in UTC.
pub fn parse_expiry_date(input: &str) -> Result<Timestamp> {
    if let Ok(at) = DateTime::parse_from_rfc3339(input) {
        return Ok(Timestamp::from_millis(at.timestamp_millis()));
    }
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .with_context(|| format!("Unrecognised date '{input}', expected YYYY-MM-DD or RFC 3339"))?;
    let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
        .context("Invalid end-of-day time")?;
    let at = Utc.from_utc_datetime(&date.and_time(end_of_day));
    Ok(Timestamp::from_millis(at.timestamp_millis()))
}

/// Formats a timestamp as RFC 3339 in UTC.
pub fn format_timestamp(at: Timestamp) -> String {
    match DateTime::<Utc>::from_timestamp_millis(at.as_millis()) {
        Some(at) => at.to_rfc3339(),
        None => at.to_string(),
    }
}
