//! Domain entities representing core business concepts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::value_objects::*;

/// Post type of the products this service reports on
pub const PRODUCT_TYPE: &str = "download";

/// Product meta holding the latest released version
pub const META_VERSION: &str = "_edd_sl_version";

/// Product meta holding the changelog markup
pub const META_CHANGELOG: &str = "_edd_sl_changelog";

/// Product meta holding required platform versions as a JSON object
pub const META_REQUIREMENTS: &str = "_edd_sl_required_versions";

/// A purchasable digital product as stored by the host platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    #[serde(default = "default_product_type")]
    pub post_type: String,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub content: String,
    pub modified: DateTime<Utc>,
    pub permalink: String,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

fn default_product_type() -> String {
    PRODUCT_TYPE.to_string()
}

impl Product {
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    /// Whether this product is tracked by the versions endpoint
    pub fn is_versioned(&self) -> bool {
        self.post_type == PRODUCT_TYPE && self.meta(META_VERSION).is_some_and(|v| !v.is_empty())
    }

    /// The version record of this product, if it has a recorded version
    pub fn version_record(&self) -> Option<VersionRecord> {
        if !self.is_versioned() {
            return None;
        }
        Some(VersionRecord {
            download_id: self.id,
            name: self.title.clone(),
            new_version: self.meta(META_VERSION).unwrap_or_default().to_string(),
        })
    }

    /// Excerpt when present, full content otherwise
    pub fn description(&self) -> &str {
        if self.excerpt.trim().is_empty() {
            &self.content
        } else {
            &self.excerpt
        }
    }

    /// Permalink of the product's changelog view
    pub fn changelog_url(&self) -> String {
        let separator = if self.permalink.contains('?') { '&' } else { '?' };
        format!("{}{}changelog=1", self.permalink, separator)
    }

    /// Modification timestamp in the store's `Y-m-d H:i:s` form
    pub fn last_updated(&self) -> String {
        self.modified.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Latest version of one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub download_id: i64,
    pub name: String,
    pub new_version: String,
}

/// An issued license tied to one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub license_id: i64,
    pub license_key: String,
    pub download_id: i64,
    pub status: LicenseStatus,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

/// Platform versions a product needs to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    pub php: String,
    pub platform_version: String,
}

impl Requirements {
    /// Read requirements from the product meta value (`{"php": "..", "wp": ".."}`).
    /// Returns `None` when the value is malformed or declares nothing.
    pub fn from_meta(raw: &str) -> Option<Self> {
        #[derive(Deserialize)]
        struct RawRequirements {
            #[serde(default)]
            php: Option<String>,
            #[serde(default)]
            wp: Option<String>,
        }

        let parsed: RawRequirements = serde_json::from_str(raw).ok()?;
        let php = parsed.php.unwrap_or_default();
        let platform_version = parsed.wp.unwrap_or_default();
        if php.is_empty() && platform_version.is_empty() {
            return None;
        }
        Some(Self {
            php,
            platform_version,
        })
    }
}

/// Description and changelog markup shown by update clients
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sections {
    pub description: String,
    pub changelog: String,
}

/// Externally visible version information for one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionResponse {
    pub download_id: i64,
    pub name: String,
    pub new_version: String,
    pub slug: String,
    pub url: String,
    pub last_updated: String,
    pub homepage: String,
    pub package: String,
    pub download_link: String,
    pub sections: Sections,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Requirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewal_link: Option<String>,
}

/// How the package of one response is resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageResolution {
    /// No usable license for the product
    Missing,
    /// The license expired; clients are pointed at the renewal checkout
    Expired { renewal_link: String },
    /// Signed, time-limited download URL
    Signed(String),
}

impl PackageResolution {
    pub fn package(&self) -> &str {
        match self {
            PackageResolution::Missing => MISSING_LICENSE,
            PackageResolution::Expired { .. } => EXPIRED_LICENSE,
            PackageResolution::Signed(url) => url,
        }
    }

    /// Overwrite the package fields of a response. Other fields are left untouched.
    pub fn apply_to(&self, response: &mut VersionResponse) {
        response.package = self.package().to_string();
        response.download_link = self.package().to_string();
        response.renewal_link = match self {
            PackageResolution::Expired { renewal_link } => Some(renewal_link.clone()),
            _ => None,
        };
    }
}

/// One entry of the legacy `versions` output.
///
/// Products without a matching license keep the bare record; licensed products
/// carry the full response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionEntry {
    Licensed(Box<VersionResponse>),
    Base(VersionRecord),
}

impl VersionEntry {
    pub fn download_id(&self) -> i64 {
        match self {
            VersionEntry::Licensed(response) => response.download_id,
            VersionEntry::Base(record) => record.download_id,
        }
    }

    pub fn package(&self) -> Option<&str> {
        match self {
            VersionEntry::Licensed(response) => Some(&response.package),
            VersionEntry::Base(_) => None,
        }
    }
}
