//! Per-node license evaluation for Licentia.
//!
//! Every node runs one event loop that owns a [`RegistryReplica`] and a
//! [`LicensesManager`]. The loop reacts to two things only:
//!
//! - a newly observed registry version, verified and re-evaluated
//! - the deadline timer, armed for the next instant validity can change
//!
//! Both feed [`LicensesManager::apply`], the single writer of the node's
//! feature state. Queries read [`FeatureSnapshot`]s without blocking, and
//! consumers subscribe to transitions through [`LicensesService::subscribe`].
//!
//! # Example
//!
//! ```
//! use licentia_license::{keys, License, LicenseSigner};
//! use licentia_manager::{ClusterConfig, FeatureStatus, LocalCluster, SystemClock};
//! use licentia_types::Timestamp;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let signer = LicenseSigner::new(keys::generate_signing_key());
//! let cluster = LocalCluster::start(
//!     ClusterConfig::default(),
//!     signer.verifier(),
//!     Arc::new(SystemClock),
//! )
//! .await?;
//!
//! let now = Timestamp::now();
//! let license = License::builder()
//!     .feature("shield")
//!     .issuer("licentia")
//!     .issued_to("acme")
//!     .issue_date(now)
//!     .expiry_date(now.saturating_add(Duration::from_secs(60)))
//!     .build()?;
//! cluster.admin()?.install_license(signer.sign(&license)?).await?;
//!
//! cluster
//!     .await_feature_status("shield", FeatureStatus::Enabled, Duration::from_secs(2))
//!     .await?;
//! cluster.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! [`RegistryReplica`]: licentia_registry::RegistryReplica

mod admin;
mod clock;
mod cluster;
mod error;
pub mod evaluation;
mod manager;
mod node;
pub mod notify;

pub use admin::LicenseAdmin;
pub use clock::{Clock, ManualClock, SystemClock};
pub use cluster::{await_feature_status, ClusterConfig, LocalCluster, CONVERGENCE_POLL_INTERVAL};
pub use error::{ManagerError, ManagerResult};
pub use evaluation::{evaluate, Evaluation};
pub use manager::{FeatureSnapshot, LicensesManager, Trigger};
pub use node::{LicenseNode, LicensesService, NodeConfig};
pub use notify::{FeatureEvent, FeatureFilter, FeatureListener, FeatureStatus, Subscription};
