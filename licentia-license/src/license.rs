//! The unsigned license record and its builder.

use crate::error::{LicenseError, LicenseResult};
use licentia_types::{LicenseUid, Timestamp};
use serde::{Deserialize, Serialize};

/// License type used when the builder is not given one.
pub const DEFAULT_LICENSE_TYPE: &str = "subscription";

/// Subscription type used when the builder is not given one.
pub const DEFAULT_SUBSCRIPTION_TYPE: &str = "none";

/// A license grant: one feature, a validity window and a node-count limit.
///
/// Instances are only produced through [`License::builder`] or by decoding a
/// signed document, both of which enforce `expiry_date > issue_date` and
/// `max_nodes >= 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    uid: LicenseUid,
    feature: String,
    issuer: String,
    issued_to: String,
    #[serde(rename = "type")]
    license_type: String,
    subscription_type: String,
    issue_date: Timestamp,
    expiry_date: Timestamp,
    max_nodes: u32,
}

impl License {
    /// Starts building a new license.
    #[must_use]
    pub fn builder() -> LicenseBuilder {
        LicenseBuilder::default()
    }

    /// Returns the license uid.
    #[must_use]
    pub fn uid(&self) -> LicenseUid {
        self.uid
    }

    /// Returns the licensed feature id.
    #[must_use]
    pub fn feature(&self) -> &str {
        &self.feature
    }

    /// Returns who issued the license.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns who the license was issued to.
    #[must_use]
    pub fn issued_to(&self) -> &str {
        &self.issued_to
    }

    /// Returns the license type (e.g. `subscription`, `trial`, `internal`).
    #[must_use]
    pub fn license_type(&self) -> &str {
        &self.license_type
    }

    /// Returns the subscription tier.
    #[must_use]
    pub fn subscription_type(&self) -> &str {
        &self.subscription_type
    }

    /// Start of the validity window (inclusive).
    #[must_use]
    pub fn issue_date(&self) -> Timestamp {
        self.issue_date
    }

    /// End of the validity window (inclusive).
    #[must_use]
    pub fn expiry_date(&self) -> Timestamp {
        self.expiry_date
    }

    /// Maximum number of cluster nodes the license covers.
    #[must_use]
    pub fn max_nodes(&self) -> u32 {
        self.max_nodes
    }

    /// Returns true if `at` falls inside `[issue_date, expiry_date]`.
    #[must_use]
    pub fn is_valid_at(&self, at: Timestamp) -> bool {
        self.issue_date <= at && at <= self.expiry_date
    }

    /// Returns true if the license has expired by `at`.
    #[must_use]
    pub fn is_expired_at(&self, at: Timestamp) -> bool {
        at > self.expiry_date
    }

    /// Returns true if this license grants `feature`.
    #[must_use]
    pub fn grants(&self, feature: &str) -> bool {
        self.feature == feature
    }

    /// Checks the construction invariants.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::InvalidLicense`] if a required field is empty,
    /// the validity window is empty or inverted, or `max_nodes` is zero.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.feature.trim().is_empty() {
            return Err(LicenseError::InvalidLicense("feature must not be empty".into()));
        }
        if self.issuer.trim().is_empty() {
            return Err(LicenseError::InvalidLicense("issuer must not be empty".into()));
        }
        if self.issued_to.trim().is_empty() {
            return Err(LicenseError::InvalidLicense("issued_to must not be empty".into()));
        }
        if self.issue_date >= self.expiry_date {
            return Err(LicenseError::InvalidLicense(format!(
                "issue date {} must be before expiry date {}",
                self.issue_date, self.expiry_date
            )));
        }
        if self.max_nodes < 1 {
            return Err(LicenseError::InvalidLicense("max_nodes must be at least 1".into()));
        }
        Ok(())
    }
}

/// Fluent builder for [`License`].
#[derive(Debug, Clone, Default)]
pub struct LicenseBuilder {
    uid: Option<LicenseUid>,
    feature: Option<String>,
    issuer: Option<String>,
    issued_to: Option<String>,
    license_type: Option<String>,
    subscription_type: Option<String>,
    issue_date: Option<Timestamp>,
    expiry_date: Option<Timestamp>,
    max_nodes: Option<u32>,
}

impl LicenseBuilder {
    /// Sets an explicit uid. A random one is generated otherwise.
    pub fn uid(mut self, uid: LicenseUid) -> Self {
        self.uid = Some(uid);
        self
    }

    /// Sets the licensed feature id.
    pub fn feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    /// Sets the issuer.
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Sets the licensee.
    pub fn issued_to(mut self, issued_to: impl Into<String>) -> Self {
        self.issued_to = Some(issued_to.into());
        self
    }

    /// Sets the license type.
    pub fn license_type(mut self, license_type: impl Into<String>) -> Self {
        self.license_type = Some(license_type.into());
        self
    }

    /// Sets the subscription tier.
    pub fn subscription_type(mut self, subscription_type: impl Into<String>) -> Self {
        self.subscription_type = Some(subscription_type.into());
        self
    }

    /// Sets the start of the validity window. Defaults to now.
    pub fn issue_date(mut self, issue_date: Timestamp) -> Self {
        self.issue_date = Some(issue_date);
        self
    }

    /// Sets the end of the validity window.
    pub fn expiry_date(mut self, expiry_date: Timestamp) -> Self {
        self.expiry_date = Some(expiry_date);
        self
    }

    /// Sets the node-count limit. Defaults to 1.
    pub fn max_nodes(mut self, max_nodes: u32) -> Self {
        self.max_nodes = Some(max_nodes);
        self
    }

    /// Builds and validates the license.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::InvalidLicense`] if a required field is missing or
    /// an invariant is violated.
    pub fn build(self) -> LicenseResult<License> {
        let license = License {
            uid: self.uid.unwrap_or_default(),
            feature: self
                .feature
                .ok_or_else(|| LicenseError::InvalidLicense("feature is required".into()))?,
            issuer: self
                .issuer
                .ok_or_else(|| LicenseError::InvalidLicense("issuer is required".into()))?,
            issued_to: self
                .issued_to
                .ok_or_else(|| LicenseError::InvalidLicense("issued_to is required".into()))?,
            license_type: self
                .license_type
                .unwrap_or_else(|| DEFAULT_LICENSE_TYPE.to_string()),
            subscription_type: self
                .subscription_type
                .unwrap_or_else(|| DEFAULT_SUBSCRIPTION_TYPE.to_string()),
            issue_date: self.issue_date.unwrap_or_else(Timestamp::now),
            expiry_date: self
                .expiry_date
                .ok_or_else(|| LicenseError::InvalidLicense("expiry_date is required".into()))?,
            max_nodes: self.max_nodes.unwrap_or(1),
        };
        license.validate()?;
        Ok(license)
    }
}
