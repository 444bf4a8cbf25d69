//! Format versions and extension version requirements
//!
//! Format versions are semantic versions (`1.5.0`); a two-component form
//! (`1.5`) is accepted and padded. Requirements use `semver` comparator
//! syntax (`>=1.4.0`, `>=1.4, <2`); `==` is accepted as an alias of `=`.

use std::fmt;
use std::str::FromStr;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VersionError {
    #[error("Invalid format version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("Invalid version requirement '{requirement}': {reason}")]
    InvalidRequirement { requirement: String, reason: String },

    #[error("Unsupported format version '{version}'. Supported versions: {supported}")]
    Unsupported { version: String, supported: String },
}

/// Format versions this crate knows how to read and write
pub const SUPPORTED_VERSIONS: &[&str] = &[
    "1.0.0", "1.1.0", "1.2.0", "1.3.0", "1.4.0", "1.5.0", "1.6.0",
];

/// Version used for new documents unless configured otherwise
pub const DEFAULT_VERSION: &str = "1.5.0";

/// The version of the overall format a document conforms to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FormatVersion(Version);

impl FormatVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(Version::new(major, minor, patch))
    }

    /// Returns the underlying semantic version
    pub fn as_semver(&self) -> &Version {
        &self.0
    }

    /// Returns the supported versions in ascending order
    pub fn supported() -> Vec<FormatVersion> {
        SUPPORTED_VERSIONS
            .iter()
            .filter_map(|v| v.parse().ok())
            .collect()
    }

    /// Returns true if this version is in [`SUPPORTED_VERSIONS`]
    pub fn is_supported(&self) -> bool {
        Self::supported().contains(self)
    }

    /// Parses a version and rejects unsupported ones
    pub fn parse_supported(s: &str) -> Result<Self, VersionError> {
        let version: FormatVersion = s.parse()?;
        if version.is_supported() {
            Ok(version)
        } else {
            Err(VersionError::Unsupported {
                version: version.to_string(),
                supported: SUPPORTED_VERSIONS.join(", "),
            })
        }
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::new(1, 5, 0)
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FormatVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let padded = match s.split('.').count() {
            2 => format!("{}.0", s),
            _ => s.to_string(),
        };

        Version::parse(&padded)
            .map(Self)
            .map_err(|e| VersionError::InvalidVersion {
                version: s.to_string(),
                reason: e.to_string(),
            })
    }
}

impl TryFrom<String> for FormatVersion {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FormatVersion> for String {
    fn from(version: FormatVersion) -> Self {
        version.to_string()
    }
}

/// A range of format versions an extension supports
///
/// The empty requirement is unconstrained and accepts every version.
#[derive(Debug, Clone, Default)]
pub struct VersionRequirement {
    source: String,
    req: Option<VersionReq>,
}

impl VersionRequirement {
    /// The requirement that accepts every version
    pub fn any() -> Self {
        Self::default()
    }

    /// Parses a requirement; blank input and `*` are unconstrained
    pub fn parse(requirement: &str) -> Result<Self, VersionError> {
        let trimmed = requirement.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::any());
        }

        let normalized = trimmed.replace("==", "=");
        let req = VersionReq::parse(&normalized).map_err(|e| VersionError::InvalidRequirement {
            requirement: trimmed.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: trimmed.to_string(),
            req: Some(req),
        })
    }

    /// Returns true if `version` falls inside this range
    pub fn matches(&self, version: &FormatVersion) -> bool {
        match &self.req {
            Some(req) => req.matches(version.as_semver()),
            None => true,
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.req.is_none()
    }

    /// The requirement as written by the extension author
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for VersionRequirement {
    fn eq(&self, other: &Self) -> bool {
        self.req == other.req
    }
}

impl Eq for VersionRequirement {}

impl fmt::Display for VersionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unconstrained() {
            write!(f, "*")
        } else {
            write!(f, "{}", self.source)
        }
    }
}

impl FromStr for VersionRequirement {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
