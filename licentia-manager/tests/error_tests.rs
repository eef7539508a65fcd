use licentia_license::LicenseError;
use licentia_manager::{FeatureStatus, ManagerError};
use licentia_registry::RegistryError;
use licentia_types::NodeId;
use std::time::Duration;

// ── Display ──────────────────────────────────────────────────────

#[test]
fn license_error_display() {
    let err = ManagerError::from(LicenseError::InvalidSignature);
    assert_eq!(err.to_string(), "license rejected: license signature invalid");
}

#[test]
fn registry_error_is_transparent() {
    let err = ManagerError::from(RegistryError::Rejected("nope".into()));
    assert_eq!(err.to_string(), "update rejected: nope");
}

#[test]
fn convergence_timeout_display() {
    let err = ManagerError::ConvergenceTimeout {
        feature: "shield".into(),
        expected: FeatureStatus::Enabled,
        waited: Duration::from_secs(2),
    };
    assert_eq!(
        err.to_string(),
        "feature 'shield' did not converge to enabled within 2s"
    );
}

#[test]
fn node_errors_display_node_id() {
    let node = NodeId::new();
    assert!(ManagerError::NodeStopped(node).to_string().contains(&node.to_string()));
    assert!(ManagerError::UnknownNode(node).to_string().contains(&node.to_string()));
}

// ── Retryability ─────────────────────────────────────────────────

#[test]
fn retryable_classification() {
    assert!(ManagerError::from(RegistryError::CoordinatorUnavailable("down".into())).is_retryable());
    assert!(ManagerError::from(RegistryError::Persistence("disk".into())).is_retryable());
    assert!(!ManagerError::from(RegistryError::Rejected("no".into())).is_retryable());
    assert!(!ManagerError::from(LicenseError::KeyMismatch).is_retryable());
    assert!(!ManagerError::NodeStopped(NodeId::new()).is_retryable());
}
