use licentia_types::{LicenseUid, NodeId};
use std::collections::HashSet;
use std::str::FromStr;

// ── LicenseUid ────────────────────────────────────────────────────

#[test]
fn license_uid_new_is_unique() {
    let a = LicenseUid::new();
    let b = LicenseUid::new();
    assert_ne!(a, b);
}

#[test]
fn license_uid_is_random_v4() {
    let uid = LicenseUid::new();
    assert_eq!(uid.as_uuid().get_version_num(), 4);
}

#[test]
fn license_uid_display_then_parse() {
    let uid = LicenseUid::new();
    let parsed = uid.to_string().parse::<LicenseUid>().unwrap();
    assert_eq!(uid, parsed);
}

#[test]
fn license_uid_parse_invalid() {
    assert!("not-a-uuid".parse::<LicenseUid>().is_err());
    assert!(LicenseUid::from_str("garbage").is_err());
}

#[test]
fn license_uid_serializes_as_plain_string() {
    let uid = LicenseUid::new();
    let json = serde_json::to_string(&uid).unwrap();
    assert_eq!(json, format!("\"{uid}\""));
    let parsed: LicenseUid = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, uid);
}

#[test]
fn license_uid_hash_and_eq() {
    let uid = LicenseUid::new();
    let mut set = HashSet::new();
    set.insert(uid);
    set.insert(uid);
    assert_eq!(set.len(), 1);
}

// ── NodeId ───────────────────────────────────────────────────────

#[test]
fn node_id_new_is_unique() {
    assert_ne!(NodeId::new(), NodeId::new());
}

#[test]
fn node_id_is_time_ordered() {
    let first = NodeId::new();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let second = NodeId::new();
    assert!(first < second);
}

#[test]
fn node_id_from_uuid_roundtrip() {
    let uuid = uuid::Uuid::now_v7();
    assert_eq!(NodeId::from_uuid(uuid).as_uuid(), uuid);
}

#[test]
fn node_id_from_str() {
    let id = NodeId::new();
    let parsed = NodeId::from_str(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
    assert!("nope".parse::<NodeId>().is_err());
}
