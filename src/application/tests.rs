// Versions workflow tests
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

use crate::application::{
    ApiRequestLog, CacheInvalidator, CacheService, LicenseResolver, OutputFilter,
    QueryDispatcher, QueryOutput, RequestLogEntry, RequestLogScope, ResponseBuilder,
    ResponseFilter, VERSIONS_V2_TRANSIENT, VersionsEndpoint, VersionsQuery,
};
use crate::application::errors::StoreError;
use crate::domain::{
    EXPIRED_LICENSE, LicenseKeySet, LicenseRecord, LicenseStatus, MISSING_LICENSE, META_CHANGELOG,
    META_REQUIREMENTS, META_VERSION, PRODUCT_TYPE, Product, VersionEntry, VersionRecord,
    VersionResponse,
};
use crate::infrastructure::{
    CacheServiceWrapper, Catalog, CatalogRepository, FileTransientStore, LicenseRepository,
    LicensingService, MemoryObjectCache, ProductRepository,
};

// Mock implementations for testing

/// Catalog store that counts reads and can hide products from single lookups
struct CountingStore {
    inner: CatalogRepository,
    list_calls: AtomicUsize,
    license_lookups: AtomicUsize,
    hidden: HashSet<i64>,
}

impl CountingStore {
    fn new(catalog: Catalog) -> Self {
        Self {
            inner: CatalogRepository::new(catalog),
            list_calls: AtomicUsize::new(0),
            license_lookups: AtomicUsize::new(0),
            hidden: HashSet::new(),
        }
    }

    fn hiding(mut self, id: i64) -> Self {
        self.hidden.insert(id);
        self
    }

    fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn license_lookups(&self) -> usize {
        self.license_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductRepository for CountingStore {
    async fn list_versioned_products(&self) -> Result<Vec<VersionRecord>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_versioned_products().await
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>, StoreError> {
        if self.hidden.contains(&id) {
            return Ok(None);
        }
        self.inner.get_product(id).await
    }

    async fn get_product_meta(&self, id: i64, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get_product_meta(id, key).await
    }

    async fn save_product(&self, product: Product) -> Result<Product, StoreError> {
        self.inner.save_product(product).await
    }
}

#[async_trait]
impl LicenseRepository for CountingStore {
    async fn find_by_keys(&self, keys: &[String]) -> Result<Vec<LicenseRecord>, StoreError> {
        self.license_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_keys(keys).await
    }

    async fn get_license(&self, license_id: i64) -> Result<Option<LicenseRecord>, StoreError> {
        self.inner.get_license(license_id).await
    }
}

/// Deterministic licensing stub
struct StubLicensing;

impl LicensingService for StubLicensing {
    fn sign_download_url(&self, download_id: i64, license_key: &str, requesting_url: &str) -> String {
        format!(
            "https://store.test/package/{}/{}?site={}",
            download_id, license_key, requesting_url
        )
    }

    fn get_renewal_url(&self, license: &LicenseRecord) -> String {
        format!("https://store.test/renew/{}", license.license_id)
    }
}

struct BetaSuffix;

impl ResponseFilter for BetaSuffix {
    fn filter(&self, mut response: VersionResponse, product: &Product) -> VersionResponse {
        if product.slug == "reach" {
            response.new_version.push_str("-beta");
        }
        response
    }
}

fn product(id: i64, title: &str, version: &str) -> Product {
    Product {
        id,
        post_type: PRODUCT_TYPE.to_string(),
        title: title.to_string(),
        slug: title.to_lowercase(),
        excerpt: String::new(),
        content: format!("{} description", title),
        modified: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
        permalink: format!("https://store.test/downloads/{}/", title.to_lowercase()),
        meta: HashMap::from([(META_VERSION.to_string(), version.to_string())]),
    }
}

fn license(id: i64, key: &str, download_id: i64, status: LicenseStatus) -> LicenseRecord {
    LicenseRecord {
        license_id: id,
        license_key: key.to_string(),
        download_id,
        status,
        parent_id: None,
    }
}

fn catalog() -> Catalog {
    let mut charitable = product(1, "Charitable", "1.8.0");
    charitable.meta.insert(
        META_REQUIREMENTS.to_string(),
        r#"{"php":"7.4","wp":"6.0"}"#.to_string(),
    );
    charitable.meta.insert(
        META_CHANGELOG.to_string(),
        "= 1.8.0 =\n* Fixed the donor\\'s receipt".to_string(),
    );

    let mut expired = license(11, "key-expired", 2, LicenseStatus::Expired);
    expired.parent_id = Some(10);

    Catalog {
        products: vec![charitable, product(2, "Reach", "2.0.1"), product(3, "Ambassadors", "")],
        licenses: vec![
            license(10, "key-active", 1, LicenseStatus::Active),
            expired,
            license(12, "key-orphan", 99, LicenseStatus::Active),
        ],
    }
}

struct Harness {
    store: Arc<CountingStore>,
    resolver: Arc<LicenseResolver>,
    transients: Arc<CacheServiceWrapper>,
    endpoint: Arc<VersionsEndpoint>,
    dispatcher: QueryDispatcher,
    invalidator: CacheInvalidator,
    _dir: TempDir,
}

fn harness_with(store: CountingStore, filter: Option<Arc<dyn ResponseFilter>>) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(store);
    let transients = Arc::new(CacheServiceWrapper::file(Arc::new(FileTransientStore::new(
        dir.path().to_path_buf(),
    ))));
    let object_cache = Arc::new(CacheServiceWrapper::memory(Arc::new(MemoryObjectCache::new())));

    let resolver = Arc::new(LicenseResolver::new(
        store.clone(),
        object_cache.clone(),
        Duration::from_secs(3600),
    ));
    let mut builder = ResponseBuilder::new(store.clone(), resolver.clone(), Arc::new(StubLicensing));
    if let Some(filter) = filter {
        builder = builder.with_filter(filter);
    }
    let endpoint = Arc::new(VersionsEndpoint::new(
        store.clone(),
        resolver.clone(),
        Arc::new(builder),
        transients.clone(),
        Duration::from_secs(3600),
    ));
    let dispatcher =
        QueryDispatcher::new(Arc::new(ApiRequestLog::new(100))).with_filter(endpoint.clone());
    let invalidator = CacheInvalidator::new(transients.clone(), object_cache);

    Harness {
        store,
        resolver,
        transients,
        endpoint,
        dispatcher,
        invalidator,
        _dir: dir,
    }
}

fn harness() -> Harness {
    harness_with(CountingStore::new(catalog()), None)
}

fn licensed(keys: &[&str]) -> VersionsQuery {
    VersionsQuery::new(
        Some(keys.iter().map(|k| k.to_string()).collect()),
        Some("https://client.test".to_string()),
    )
}

fn responses(output: QueryOutput) -> Vec<VersionResponse> {
    match output {
        QueryOutput::Responses(responses) => responses,
        other => panic!("expected versions-v2 responses, got {:?}", other),
    }
}

fn by_id(responses: &[VersionResponse], id: i64) -> &VersionResponse {
    responses
        .iter()
        .find(|r| r.download_id == id)
        .unwrap_or_else(|| panic!("no response for download {}", id))
}

#[tokio::test]
async fn v1_without_licenses_returns_plain_records() {
    let h = harness();
    let output = h
        .dispatcher
        .dispatch("versions", &VersionsQuery::default())
        .await
        .unwrap();

    match output {
        QueryOutput::Versions(records) => {
            let ids: Vec<i64> = records.iter().map(|r| r.download_id).collect();
            assert_eq!(ids, vec![1, 2]);
            assert_eq!(records[0].new_version, "1.8.0");
        }
        other => panic!("unexpected output {:?}", other),
    }
}

#[tokio::test]
async fn v1_with_licenses_merges_licensed_products_by_name() {
    let h = harness();
    let output = h
        .dispatcher
        .dispatch("versions", &licensed(&["key-active", "key-expired"]))
        .await
        .unwrap();

    let QueryOutput::NamedVersions(entries) = output else {
        panic!("expected named versions");
    };
    assert_eq!(entries.len(), 2);

    let VersionEntry::Licensed(charitable) = &entries["Charitable"] else {
        panic!("Charitable should carry a full response");
    };
    assert_eq!(
        charitable.package,
        "https://store.test/package/1/key-active?site=https://client.test"
    );
    assert_eq!(charitable.download_link, charitable.package);
    assert!(charitable.requirements.is_none());

    let VersionEntry::Licensed(reach) = &entries["Reach"] else {
        panic!("Reach should carry a full response");
    };
    assert_eq!(reach.package, EXPIRED_LICENSE);
}

#[tokio::test]
async fn v1_leaves_unlicensed_products_as_records() {
    let h = harness();
    let output = h
        .dispatcher
        .dispatch("versions", &licensed(&["key-active"]))
        .await
        .unwrap();

    let QueryOutput::NamedVersions(entries) = output else {
        panic!("expected named versions");
    };
    assert!(matches!(entries["Reach"], VersionEntry::Base(_)));
    assert_eq!(entries["Reach"].package(), None);
    assert_eq!(entries["Charitable"].download_id(), 1);
}

#[tokio::test]
async fn v1_reads_the_store_on_every_request() {
    let h = harness();
    let query = VersionsQuery::default();
    h.dispatcher.dispatch("versions", &query).await.unwrap();
    h.dispatcher.dispatch("versions", &query).await.unwrap();
    assert_eq!(h.store.list_calls(), 2);
}

#[tokio::test]
async fn v2_without_licenses_never_exposes_packages() {
    let h = harness();
    let items = responses(
        h.dispatcher
            .dispatch("versions-v2", &VersionsQuery::default())
            .await
            .unwrap(),
    );

    assert_eq!(items.len(), 2);
    for item in &items {
        assert_eq!(item.package, MISSING_LICENSE);
        assert_eq!(item.download_link, MISSING_LICENSE);
        assert!(item.renewal_link.is_none());
    }
}

#[tokio::test]
async fn v2_signs_packages_for_active_licenses() {
    let h = harness();
    let items = responses(
        h.dispatcher
            .dispatch("versions-v2", &licensed(&["key-active"]))
            .await
            .unwrap(),
    );

    let charitable = by_id(&items, 1);
    assert_eq!(
        charitable.package,
        "https://store.test/package/1/key-active?site=https://client.test"
    );
    assert_eq!(charitable.download_link, charitable.package);
    assert_eq!(by_id(&items, 2).package, MISSING_LICENSE);
}

#[tokio::test]
async fn v2_expired_license_points_at_parent_renewal() {
    let h = harness();
    let items = responses(
        h.dispatcher
            .dispatch("versions-v2", &licensed(&["key-expired"]))
            .await
            .unwrap(),
    );

    let reach = by_id(&items, 2);
    assert_eq!(reach.package, EXPIRED_LICENSE);
    assert_eq!(reach.download_link, EXPIRED_LICENSE);
    assert_eq!(reach.renewal_link.as_deref(), Some("https://store.test/renew/10"));
}

#[tokio::test]
async fn expired_license_without_parent_renews_itself() {
    let mut catalog = catalog();
    catalog.licenses.push(license(20, "lonely", 2, LicenseStatus::Expired));
    let h = harness_with(CountingStore::new(catalog), None);

    let items = responses(
        h.dispatcher
            .dispatch("versions-v2", &licensed(&["lonely"]))
            .await
            .unwrap(),
    );
    assert_eq!(
        by_id(&items, 2).renewal_link.as_deref(),
        Some("https://store.test/renew/20")
    );
}

#[tokio::test]
async fn v2_includes_requirements_and_sanitized_sections() {
    let h = harness();
    let items = responses(
        h.dispatcher
            .dispatch("versions-v2", &VersionsQuery::default())
            .await
            .unwrap(),
    );

    let charitable = by_id(&items, 1);
    let requirements = charitable.requirements.as_ref().unwrap();
    assert_eq!(requirements.php, "7.4");
    assert_eq!(requirements.platform_version, "6.0");
    assert_eq!(charitable.url, "https://store.test/downloads/charitable/?changelog=1");
    assert_eq!(charitable.last_updated, "2024-05-01 12:30:00");
    assert_eq!(charitable.sections.description, "<p>Charitable description</p>");
    assert!(charitable.sections.changelog.contains("donor's receipt"));
    assert!(!charitable.sections.changelog.contains('\\'));

    assert!(by_id(&items, 2).requirements.is_none());
}

#[tokio::test]
async fn sections_strip_disallowed_markup() {
    let mut catalog = catalog();
    catalog.products[1].content =
        "<p>Safe <strong>text</strong></p><script>alert(1)</script><iframe src=x></iframe>"
            .to_string();
    let h = harness_with(CountingStore::new(catalog), None);

    let items = responses(
        h.dispatcher
            .dispatch("versions-v2", &VersionsQuery::default())
            .await
            .unwrap(),
    );
    let description = &by_id(&items, 2).sections.description;
    assert!(description.contains("<strong>text</strong>"));
    assert!(!description.contains("<script"));
    assert!(!description.contains("<iframe"));
}

#[tokio::test]
async fn v2_serves_repeat_requests_from_the_transient() {
    let h = harness();
    let first = responses(
        h.dispatcher
            .dispatch("versions-v2", &VersionsQuery::default())
            .await
            .unwrap(),
    );
    let second = responses(
        h.dispatcher
            .dispatch("versions-v2", &licensed(&["key-active"]))
            .await
            .unwrap(),
    );

    assert_eq!(h.store.list_calls(), 1);
    assert_eq!(first.len(), second.len());
    let cached: Option<Vec<VersionResponse>> =
        h.transients.get(VERSIONS_V2_TRANSIENT).await.unwrap();
    assert!(cached.unwrap().iter().all(|r| r.package == MISSING_LICENSE));
}

#[tokio::test]
async fn saving_a_product_refreshes_the_cached_set() {
    let h = harness();
    let query = VersionsQuery::default();
    h.dispatcher.dispatch("versions-v2", &query).await.unwrap();

    h.store.save_product(product(2, "Reach", "2.1.0")).await.unwrap();
    assert!(h.invalidator.on_product_saved(PRODUCT_TYPE).await.unwrap());

    let items = responses(h.dispatcher.dispatch("versions-v2", &query).await.unwrap());
    assert_eq!(h.store.list_calls(), 2);
    assert_eq!(by_id(&items, 2).new_version, "2.1.0");
}

#[tokio::test]
async fn saving_other_post_types_keeps_caches() {
    let h = harness();
    let query = VersionsQuery::default();
    h.dispatcher.dispatch("versions-v2", &query).await.unwrap();

    assert!(!h.invalidator.on_product_saved("page").await.unwrap());
    h.dispatcher.dispatch("versions-v2", &query).await.unwrap();
    assert_eq!(h.store.list_calls(), 1);
}

#[tokio::test]
async fn license_lookups_are_cached_regardless_of_key_order() {
    let h = harness();
    h.dispatcher
        .dispatch("versions-v2", &licensed(&["key-active", "key-expired"]))
        .await
        .unwrap();
    h.dispatcher
        .dispatch("versions", &licensed(&["key-expired", " key-active ", "key-active"]))
        .await
        .unwrap();
    assert_eq!(h.store.license_lookups(), 1);

    h.invalidator.flush().await.unwrap();
    h.dispatcher
        .dispatch("versions-v2", &licensed(&["key-active", "key-expired"]))
        .await
        .unwrap();
    assert_eq!(h.store.license_lookups(), 2);
}

#[tokio::test]
async fn cached_license_lookups_return_the_same_licenses() {
    let h = harness();

    let first = h
        .resolver
        .resolve_licenses(&LicenseKeySet::new(["key-active", "key-expired"]))
        .await
        .unwrap();
    let second = h
        .resolver
        .resolve_licenses(&LicenseKeySet::new(["key-expired", "key-active"]))
        .await
        .unwrap();

    assert_eq!(h.store.license_lookups(), 1);
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(first[&1].license_key, "key-active");
    assert_eq!(first[&2].status, LicenseStatus::Expired);
}

#[tokio::test]
async fn blank_license_keys_count_as_unlicensed() {
    let h = harness();
    let items = responses(
        h.dispatcher
            .dispatch("versions-v2", &licensed(&["", "  "]))
            .await
            .unwrap(),
    );
    assert!(items.iter().all(|r| r.package == MISSING_LICENSE));
    assert_eq!(h.store.license_lookups(), 0);

    let no_url = VersionsQuery::new(Some(vec!["key-active".to_string()]), None);
    let output = h.dispatcher.dispatch("versions", &no_url).await.unwrap();
    assert!(matches!(output, QueryOutput::Versions(_)));
}

#[tokio::test]
async fn missing_products_are_dropped() {
    let h = harness_with(CountingStore::new(catalog()).hiding(2), None);
    let items = responses(
        h.dispatcher
            .dispatch("versions-v2", &VersionsQuery::default())
            .await
            .unwrap(),
    );
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].download_id, 1);
}

#[tokio::test]
async fn duplicate_download_ids_are_built_once() {
    let mut catalog = catalog();
    catalog.products.push(product(1, "Charitable", "1.8.0"));
    let h = harness_with(CountingStore::new(catalog), None);

    let items = responses(
        h.dispatcher
            .dispatch("versions-v2", &VersionsQuery::default())
            .await
            .unwrap(),
    );
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn response_filters_adjust_built_responses() {
    let h = harness_with(CountingStore::new(catalog()), Some(Arc::new(BetaSuffix)));
    let items = responses(
        h.dispatcher
            .dispatch("versions-v2", &VersionsQuery::default())
            .await
            .unwrap(),
    );
    assert_eq!(by_id(&items, 2).new_version, "2.0.1-beta");
    assert_eq!(by_id(&items, 1).new_version, "1.8.0");
}

#[tokio::test]
async fn versions_requests_are_not_logged() {
    let h = harness();
    h.dispatcher
        .dispatch("versions", &VersionsQuery::default())
        .await
        .unwrap();
    h.dispatcher
        .dispatch("versions-v2", &licensed(&["key-active"]))
        .await
        .unwrap();
    assert!(h.dispatcher.request_log().entries().is_empty());
}

#[tokio::test]
async fn other_modes_pass_through_and_are_logged() {
    let h = harness();
    let output = h
        .dispatcher
        .dispatch("info", &VersionsQuery::default())
        .await
        .unwrap();

    let QueryOutput::Info(info) = output else {
        panic!("expected api info");
    };
    assert!(info.query_modes.contains(&"versions-v2".to_string()));

    let entries = h.dispatcher.request_log().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].endpoint, "info");
    assert_eq!(h.store.list_calls(), 0);
}

#[tokio::test]
async fn endpoint_passes_unrelated_data_through() {
    let h = harness();
    let scope = RequestLogScope::new();
    let outcome = h
        .endpoint
        .filter(QueryOutput::Empty, "sales", &VersionsQuery::default(), &scope)
        .await
        .unwrap();
    assert_eq!(outcome.data, QueryOutput::Empty);
    assert!(outcome.logging.is_none());
    assert!(scope.is_enabled());
}

#[tokio::test]
async fn logging_is_restored_after_each_handler_returns() {
    let h = harness();
    for (mode, query) in [
        ("versions", VersionsQuery::default()),
        ("versions", licensed(&["key-active"])),
        ("versions-v2", VersionsQuery::default()),
        ("versions-v2", licensed(&["key-active"])),
    ] {
        let scope = RequestLogScope::new();
        let outcome = h
            .endpoint
            .filter(QueryOutput::Empty, mode, &query, &scope)
            .await
            .unwrap();
        assert!(!scope.is_enabled(), "{} should suppress logging", mode);
        drop(outcome);
        assert!(scope.is_enabled(), "{} should restore logging", mode);
    }

    h.dispatcher.dispatch("info", &VersionsQuery::default()).await.unwrap();
    assert_eq!(h.dispatcher.request_log().entries().len(), 1);
}

#[tokio::test]
async fn unknown_query_modes_are_rejected() {
    let h = harness();
    let err = h
        .dispatcher
        .dispatch("versions-v3", &VersionsQuery::default())
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "invalid_query");
    assert!(h.dispatcher.request_log().entries().is_empty());
}

#[test]
fn request_log_keeps_the_newest_entries() {
    let log = ApiRequestLog::new(3);
    for i in 0..5 {
        log.record(RequestLogEntry {
            endpoint: format!("mode-{}", i),
            licensed: i % 2 == 0,
        });
    }

    let endpoints: Vec<String> = log.entries().into_iter().map(|e| e.endpoint).collect();
    assert_eq!(endpoints, vec!["mode-2", "mode-3", "mode-4"]);
}
