//! API request and response models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::VersionsQuery;
use crate::domain::{PRODUCT_TYPE, Product};

/// License keys as sent by update clients
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum LicenseList {
    /// JSON array of keys
    Many(Vec<String>),
    /// Comma separated keys, as sent in query strings and form bodies
    Joined(String),
}

impl LicenseList {
    pub fn into_keys(self) -> Vec<String> {
        match self {
            LicenseList::Many(keys) => keys,
            LicenseList::Joined(joined) => joined.split(',').map(str::to_string).collect(),
        }
    }
}

/// Parameters of the versions query modes
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct VersionsRequest {
    /// License keys of the requesting site
    #[schema(example = json!(["0b9d4b5c6a0e", "7fce3c2d1a9b"]))]
    pub licenses: Option<LicenseList>,

    /// URL of the requesting site, bound into signed package links
    #[schema(example = "https://client.example.com")]
    pub url: Option<String>,
}

impl VersionsRequest {
    /// Fill fields missing here from `fallback`
    pub fn or(self, fallback: VersionsRequest) -> Self {
        Self {
            licenses: self.licenses.or(fallback.licenses),
            url: self.url.or(fallback.url),
        }
    }
}

impl From<VersionsRequest> for VersionsQuery {
    fn from(request: VersionsRequest) -> Self {
        VersionsQuery::new(request.licenses.map(LicenseList::into_keys), request.url)
    }
}

/// Product written through the admin API
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProductRequest {
    /// Product type; only `download` products are reported by the versions modes
    #[schema(example = "download")]
    pub post_type: Option<String>,

    #[schema(example = "Charitable")]
    pub title: String,

    #[schema(example = "charitable")]
    pub slug: String,

    #[serde(default)]
    pub excerpt: String,

    #[serde(default)]
    pub content: String,

    #[schema(example = "https://store.example.com/downloads/charitable/")]
    pub permalink: String,

    /// Defaults to the time of the request
    pub modified: Option<DateTime<Utc>>,

    /// Product meta such as `_edd_sl_version` and `_edd_sl_changelog`
    #[serde(default)]
    #[schema(example = json!({"_edd_sl_version": "1.8.0"}))]
    pub meta: HashMap<String, String>,
}

impl ProductRequest {
    pub fn into_product(self, id: i64) -> Product {
        Product {
            id,
            post_type: self
                .post_type
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| PRODUCT_TYPE.to_string()),
            title: self.title,
            slug: self.slug,
            excerpt: self.excerpt,
            content: self.content,
            modified: self.modified.unwrap_or_else(Utc::now),
            permalink: self.permalink,
            meta: self.meta,
        }
    }
}

/// Product as stored
#[derive(Debug, Serialize, ToSchema)]
pub struct ProductResponse {
    #[schema(example = 42)]
    pub id: i64,
    #[schema(example = "download")]
    pub post_type: String,
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub content: String,
    pub permalink: String,
    pub modified: DateTime<Utc>,
    pub meta: HashMap<String, String>,
    /// Whether saving the product cleared the version caches
    #[schema(example = true)]
    pub caches_cleared: bool,
}

impl ProductResponse {
    pub fn new(product: Product, caches_cleared: bool) -> Self {
        Self {
            id: product.id,
            post_type: product.post_type,
            title: product.title,
            slug: product.slug,
            excerpt: product.excerpt,
            content: product.content,
            permalink: product.permalink,
            modified: product.modified,
            meta: product.meta,
            caches_cleared,
        }
    }
}

/// Statistics of one cache tier
#[derive(Debug, Serialize, ToSchema)]
pub struct CacheTierDto {
    #[schema(example = "file")]
    pub cache_type: String,
    pub hits: u64,
    pub misses: u64,
    #[schema(example = 75.0)]
    pub hit_rate: f64,
    pub entries: usize,
}

/// Statistics of both cache tiers
#[derive(Debug, Serialize, ToSchema)]
pub struct CacheStatsResponse {
    pub transients: CacheTierDto,
    pub object_cache: CacheTierDto,
}

/// Result of a manual cache flush
#[derive(Debug, Serialize, ToSchema)]
pub struct CacheFlushResponse {
    #[schema(example = "Version caches cleared")]
    pub message: String,
    pub flushed_at: DateTime<Utc>,
}

/// Standard error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code
    #[schema(example = "invalid_query")]
    pub code: String,

    /// Human-readable error message
    #[schema(example = "Unknown query mode")]
    pub message: String,

    /// Additional error context
    #[schema(example = r#"{"error": "Invalid query mode: sales"}"#)]
    pub details: Option<serde_json::Value>,

    /// Unique request identifier for tracking and support
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub request_id: Uuid,

    /// Error occurrence timestamp
    #[schema(example = "2024-01-15T10:30:00Z")]
    pub timestamp: DateTime<Utc>,
}

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall service health status
    #[schema(example = "healthy")]
    pub status: String,

    /// Current service version
    #[schema(example = "0.2.0")]
    pub version: String,

    /// Health check timestamp
    #[schema(example = "2024-01-15T10:30:00Z")]
    pub timestamp: DateTime<Utc>,

    /// Cache statistics, uptime and build information
    pub details: Option<serde_json::Value>,
}
