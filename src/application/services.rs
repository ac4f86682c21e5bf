//! Application services implementing the version lookup workflow

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::errors::ApplicationError;
use crate::domain::{
    HtmlSanitizer, LicenseKeySet, LicenseRecord, PackageResolution, Product, QueryMode,
    Requirements, Sections, VersionRecord, VersionResponse, META_CHANGELOG, META_REQUIREMENTS,
    PRODUCT_TYPE, format_section, unslash,
};
use crate::infrastructure::{
    CacheServiceWrapper, LicenseRepository, LicensingService, ProductRepository,
    index_by_download,
};

/// Object cache namespace for license lookups
pub const LICENSE_CACHE_NAMESPACE: &str = "eddvapi_licenses";

/// Transient holding the license-agnostic versions-v2 response set
pub const VERSIONS_V2_TRANSIENT: &str = "eddvapi_versions_v2";

/// Service for caching operations
#[async_trait]
pub trait CacheService: Send + Sync {
    async fn get<T>(&self, key: &str) -> Result<Option<T>, ApplicationError>
    where
        T: serde::de::DeserializeOwned + Send;

    async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), ApplicationError>
    where
        T: serde::Serialize + Send + Sync;

    async fn invalidate(&self, key: &str) -> Result<(), ApplicationError>;
}

/// Hook letting external code adjust a response before it is returned
pub trait ResponseFilter: Send + Sync {
    fn filter(&self, response: VersionResponse, product: &Product) -> VersionResponse;
}

/// Maps license keys to license records through the object cache
pub struct LicenseResolver {
    licenses: Arc<dyn LicenseRepository>,
    object_cache: Arc<CacheServiceWrapper>,
    ttl: Duration,
}

impl LicenseResolver {
    pub fn new(
        licenses: Arc<dyn LicenseRepository>,
        object_cache: Arc<CacheServiceWrapper>,
        ttl: Duration,
    ) -> Self {
        Self {
            licenses,
            object_cache,
            ttl,
        }
    }

    /// Licenses for `keys`, indexed by download id.
    ///
    /// When two keys license the same download the later store row wins.
    pub async fn resolve_licenses(
        &self,
        keys: &LicenseKeySet,
    ) -> Result<HashMap<i64, LicenseRecord>, ApplicationError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let cache_key = keys.cache_key();
        let cached: Option<Vec<LicenseRecord>> = self
            .object_cache
            .get_cached(&cache_key, LICENSE_CACHE_NAMESPACE)
            .await?;

        let rows = match cached {
            Some(rows) => {
                debug!(keys = keys.len(), "License lookup served from cache");
                rows
            }
            None => {
                let rows = self.licenses.find_by_keys(keys.as_slice()).await?;
                debug!(
                    keys = keys.len(),
                    matched = rows.len(),
                    "License lookup read from store"
                );
                self.object_cache
                    .set_cached(&cache_key, &rows, LICENSE_CACHE_NAMESPACE, self.ttl)
                    .await?;
                rows
            }
        };

        Ok(index_by_download(rows))
    }

    /// One license by id, straight from the store
    pub async fn resolve_license(
        &self,
        license_id: i64,
    ) -> Result<Option<LicenseRecord>, ApplicationError> {
        Ok(self.licenses.get_license(license_id).await?)
    }
}

/// A license matched to a product together with the requesting site
#[derive(Debug, Clone, Copy)]
pub struct LicensedRequest<'a> {
    pub license: &'a LicenseRecord,
    pub site_url: &'a str,
}

/// Builds the externally visible response for one product
pub struct ResponseBuilder {
    products: Arc<dyn ProductRepository>,
    resolver: Arc<LicenseResolver>,
    licensing: Arc<dyn LicensingService>,
    sanitizer: HtmlSanitizer,
    filters: Vec<Arc<dyn ResponseFilter>>,
}

impl ResponseBuilder {
    pub fn new(
        products: Arc<dyn ProductRepository>,
        resolver: Arc<LicenseResolver>,
        licensing: Arc<dyn LicensingService>,
    ) -> Self {
        Self {
            products,
            resolver,
            licensing,
            sanitizer: HtmlSanitizer::for_sections(),
            filters: Vec::new(),
        }
    }

    /// Register a response filter; filters run in registration order
    pub fn with_filter(mut self, filter: Arc<dyn ResponseFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Build the response for `version`.
    ///
    /// Returns `None` when the product no longer exists; callers drop the record.
    pub async fn build_response(
        &self,
        version: &VersionRecord,
        license: Option<LicensedRequest<'_>>,
        mode: QueryMode,
    ) -> Result<Option<VersionResponse>, ApplicationError> {
        let Some(product) = self.products.get_product(version.download_id).await? else {
            debug!(
                download_id = version.download_id,
                "Product not found, dropping version record"
            );
            return Ok(None);
        };

        let changelog = self
            .products
            .get_product_meta(product.id, META_CHANGELOG)
            .await?
            .unwrap_or_default();

        let sections = Sections {
            description: format_section(&self.sanitizer, product.description()),
            changelog: format_section(&self.sanitizer, &unslash(&changelog)),
        };

        let requirements = if mode.includes_requirements() {
            self.products
                .get_product_meta(product.id, META_REQUIREMENTS)
                .await?
                .and_then(|raw| Requirements::from_meta(&raw))
        } else {
            None
        };

        let mut response = VersionResponse {
            download_id: version.download_id,
            name: version.name.clone(),
            new_version: version.new_version.clone(),
            slug: product.slug.clone(),
            url: product.changelog_url(),
            last_updated: product.last_updated(),
            homepage: product.permalink.clone(),
            package: String::new(),
            download_link: String::new(),
            sections,
            requirements,
            renewal_link: None,
        };

        self.resolve_package(version.download_id, license)
            .await?
            .apply_to(&mut response);

        Ok(Some(self.apply_filters(response, &product)))
    }

    /// Decide the package of `download_id` for an optional license
    pub async fn resolve_package(
        &self,
        download_id: i64,
        license: Option<LicensedRequest<'_>>,
    ) -> Result<PackageResolution, ApplicationError> {
        let Some(LicensedRequest { license, site_url }) = license else {
            return Ok(PackageResolution::Missing);
        };

        if license.status.is_expired() {
            let parent = match license.parent_id {
                Some(parent_id) => self.resolver.resolve_license(parent_id).await?,
                None => None,
            };
            let renewing = parent.as_ref().unwrap_or(license);
            return Ok(PackageResolution::Expired {
                renewal_link: self.licensing.get_renewal_url(renewing),
            });
        }

        Ok(PackageResolution::Signed(self.licensing.sign_download_url(
            download_id,
            &license.license_key,
            site_url,
        )))
    }

    fn apply_filters(&self, response: VersionResponse, product: &Product) -> VersionResponse {
        self.filters
            .iter()
            .fold(response, |response, filter| filter.filter(response, product))
    }
}

/// Clears every cache when managed products change
pub struct CacheInvalidator {
    transients: Arc<CacheServiceWrapper>,
    object_cache: Arc<CacheServiceWrapper>,
}

impl CacheInvalidator {
    pub fn new(transients: Arc<CacheServiceWrapper>, object_cache: Arc<CacheServiceWrapper>) -> Self {
        Self {
            transients,
            object_cache,
        }
    }

    /// React to a product save. Returns whether the caches were cleared.
    pub async fn on_product_saved(&self, product_type: &str) -> Result<bool, ApplicationError> {
        if product_type != PRODUCT_TYPE {
            debug!(product_type, "Ignoring save of unmanaged product type");
            return Ok(false);
        }

        self.flush().await?;
        Ok(true)
    }

    /// Drop the cached response set and every license lookup
    pub async fn flush(&self) -> Result<(), ApplicationError> {
        self.transients.invalidate(VERSIONS_V2_TRANSIENT).await?;
        self.object_cache.clear_all().await?;
        info!("Version caches cleared");
        Ok(())
    }
}
