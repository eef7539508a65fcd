//! Core type definitions for Licentia.
//!
//! This crate defines the small set of types shared by every other crate:
//! - License and node identifiers (UUID v4 / v7)
//! - Millisecond wall-clock timestamps used for issue and expiry dates

mod ids;
mod timestamp;

pub use ids::{LicenseUid, NodeId};
pub use timestamp::Timestamp;
