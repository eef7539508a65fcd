//! Pure license evaluation.
//!
//! Derives the enabled feature set and the next instant at which it can
//! change from the observed registry state, the signature verdict and the
//! current time. Nothing here reads a clock or touches shared state.

use licentia_license::SignedLicense;
use licentia_registry::RegistryState;
use licentia_types::{LicenseUid, Timestamp};
use std::collections::BTreeSet;

/// The outcome of evaluating a registry state at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Evaluation {
    /// Features enabled at the evaluation instant.
    pub enabled: BTreeSet<String>,
    /// The next instant at which validity can change, if any.
    pub next_deadline: Option<Timestamp>,
    /// The license the evaluation was derived from.
    pub license_uid: Option<LicenseUid>,
}

/// Evaluates `state` at `now`.
///
/// A feature is enabled iff a license is present, its signature verified,
/// `issue_date <= now <= expiry_date`, and the license grants the feature.
/// The deadline is the issue date for a license not yet valid and one
/// millisecond past expiry for a valid one.
pub fn evaluate(state: &RegistryState, signature_valid: bool, now: Timestamp) -> Evaluation {
    match state.active_license() {
        Some(signed) if signature_valid => evaluate_license(signed, now),
        Some(signed) => Evaluation {
            license_uid: Some(signed.uid()),
            ..Evaluation::default()
        },
        None => Evaluation::default(),
    }
}

fn evaluate_license(signed: &SignedLicense, now: Timestamp) -> Evaluation {
    let license = signed.license();
    let mut evaluation = Evaluation {
        license_uid: Some(license.uid()),
        ..Evaluation::default()
    };

    if now < license.issue_date() {
        evaluation.next_deadline = Some(license.issue_date());
    } else if license.is_valid_at(now) {
        evaluation.enabled.insert(license.feature().to_string());
        evaluation.next_deadline = Some(license.expiry_date().offset_millis(1));
    }
    evaluation
}
