//! Domain value objects representing immutable concepts

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use super::errors::DomainError;

/// Package placeholder used when no license matched the product.
pub const MISSING_LICENSE: &str = "missing_license";

/// Package placeholder used when the matching license has expired.
pub const EXPIRED_LICENSE: &str = "expired_license";

/// Status of an issued license.
///
/// Unknown status strings coming from the store are read as `Inactive` so that a
/// new upstream status never makes a license look expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LicenseStatus {
    Active,
    Inactive,
    Expired,
    Disabled,
}

impl LicenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Active => "active",
            LicenseStatus::Inactive => "inactive",
            LicenseStatus::Expired => "expired",
            LicenseStatus::Disabled => "disabled",
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, LicenseStatus::Expired)
    }
}

impl From<String> for LicenseStatus {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => LicenseStatus::Active,
            "expired" => LicenseStatus::Expired,
            "disabled" => LicenseStatus::Disabled,
            _ => LicenseStatus::Inactive,
        }
    }
}

impl From<LicenseStatus> for String {
    fn from(status: LicenseStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query modes served by the versions endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryMode {
    /// Legacy output, keyed by product name
    Versions,
    /// Cached output, keyed by download id
    VersionsV2,
}

impl QueryMode {
    pub const ALL: [QueryMode; 2] = [QueryMode::Versions, QueryMode::VersionsV2];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryMode::Versions => "versions",
            QueryMode::VersionsV2 => "versions-v2",
        }
    }

    /// Only the v2 output carries platform requirements.
    pub fn includes_requirements(&self) -> bool {
        matches!(self, QueryMode::VersionsV2)
    }
}

impl FromStr for QueryMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "versions" => Ok(QueryMode::Versions),
            "versions-v2" => Ok(QueryMode::VersionsV2),
            other => Err(DomainError::InvalidQueryMode {
                mode: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filtered collection of license keys supplied by a client.
///
/// Blank keys are dropped and duplicates collapsed while keeping the first
/// occurrence, so lookups see each key once in the order the client sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LicenseKeySet {
    keys: Vec<String>,
}

impl LicenseKeySet {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filtered: Vec<String> = Vec::new();
        for key in keys {
            let key = key.as_ref().trim();
            if key.is_empty() || filtered.iter().any(|k| k == key) {
                continue;
            }
            filtered.push(key.to_string());
        }
        Self { keys: filtered }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.keys
    }

    /// Order-insensitive cache key for this set of licenses.
    pub fn cache_key(&self) -> String {
        let mut sorted: Vec<&str> = self.keys.iter().map(String::as_str).collect();
        sorted.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update(sorted.join(",").as_bytes());
        hex::encode(hasher.finalize())
    }
}
