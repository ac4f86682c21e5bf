//! Repository implementations

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::application::errors::StoreError;
use crate::domain::{LicenseRecord, Product, VersionRecord};

/// Read access to the host's product store
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Every product of the managed type with a non-empty version, in store order
    async fn list_versioned_products(&self) -> Result<Vec<VersionRecord>, StoreError>;

    async fn get_product(&self, id: i64) -> Result<Option<Product>, StoreError>;

    async fn get_product_meta(&self, id: i64, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or replace a product
    async fn save_product(&self, product: Product) -> Result<Product, StoreError>;
}

/// Read access to issued licenses
#[async_trait]
pub trait LicenseRepository: Send + Sync {
    /// All licenses whose key is one of `keys`, in store order
    async fn find_by_keys(&self, keys: &[String]) -> Result<Vec<LicenseRecord>, StoreError>;

    async fn get_license(&self, license_id: i64) -> Result<Option<LicenseRecord>, StoreError>;
}

/// Serialized form of the store contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub licenses: Vec<LicenseRecord>,
}

/// In-process store over a JSON catalog.
///
/// Products keep their insertion order; saving an existing id replaces it in place.
pub struct CatalogRepository {
    catalog: RwLock<Catalog>,
}

impl CatalogRepository {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: RwLock::new(catalog),
        }
    }

    pub fn empty() -> Self {
        Self::new(Catalog::default())
    }

    /// Load the catalog from a JSON file
    pub async fn from_path(path: &Path) -> Result<Self, StoreError> {
        let content = fs::read_to_string(path).await?;
        let catalog: Catalog = serde_json::from_str(&content)?;
        info!(
            path = %path.display(),
            products = catalog.products.len(),
            licenses = catalog.licenses.len(),
            "Loaded product catalog"
        );
        Ok(Self::new(catalog))
    }

    /// Insert or replace a license
    pub async fn save_license(&self, license: LicenseRecord) {
        let mut catalog = self.catalog.write().await;
        match catalog
            .licenses
            .iter_mut()
            .find(|l| l.license_id == license.license_id)
        {
            Some(existing) => *existing = license,
            None => catalog.licenses.push(license),
        }
    }

    pub async fn snapshot(&self) -> Catalog {
        self.catalog.read().await.clone()
    }
}

#[async_trait]
impl ProductRepository for CatalogRepository {
    async fn list_versioned_products(&self) -> Result<Vec<VersionRecord>, StoreError> {
        let catalog = self.catalog.read().await;
        let versions: Vec<VersionRecord> = catalog
            .products
            .iter()
            .filter_map(Product::version_record)
            .collect();
        debug!("Read {} versioned products from catalog", versions.len());
        Ok(versions)
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>, StoreError> {
        let catalog = self.catalog.read().await;
        Ok(catalog.products.iter().find(|p| p.id == id).cloned())
    }

    async fn get_product_meta(&self, id: i64, key: &str) -> Result<Option<String>, StoreError> {
        let catalog = self.catalog.read().await;
        Ok(catalog
            .products
            .iter()
            .find(|p| p.id == id)
            .and_then(|p| p.meta(key))
            .map(str::to_string))
    }

    async fn save_product(&self, product: Product) -> Result<Product, StoreError> {
        let mut catalog = self.catalog.write().await;
        match catalog.products.iter_mut().find(|p| p.id == product.id) {
            Some(existing) => *existing = product.clone(),
            None => catalog.products.push(product.clone()),
        }
        debug!(product_id = product.id, "Saved product");
        Ok(product)
    }
}

#[async_trait]
impl LicenseRepository for CatalogRepository {
    async fn find_by_keys(&self, keys: &[String]) -> Result<Vec<LicenseRecord>, StoreError> {
        let catalog = self.catalog.read().await;
        Ok(catalog
            .licenses
            .iter()
            .filter(|l| keys.contains(&l.license_key))
            .cloned()
            .collect())
    }

    async fn get_license(&self, license_id: i64) -> Result<Option<LicenseRecord>, StoreError> {
        let catalog = self.catalog.read().await;
        Ok(catalog
            .licenses
            .iter()
            .find(|l| l.license_id == license_id)
            .cloned())
    }
}

/// Index license rows by download id. Later rows win on duplicates.
pub fn index_by_download(rows: Vec<LicenseRecord>) -> HashMap<i64, LicenseRecord> {
    let mut indexed = HashMap::with_capacity(rows.len());
    for row in rows {
        indexed.insert(row.download_id, row);
    }
    indexed
}
