//! Use cases representing application workflows

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use super::errors::ApplicationError;
use super::services::{
    CacheService, LicenseResolver, LicensedRequest, ResponseBuilder, VERSIONS_V2_TRANSIENT,
};
use crate::domain::{
    DomainError, LicenseKeySet, QueryMode, VersionEntry, VersionRecord, VersionResponse,
};
use crate::infrastructure::{CacheServiceWrapper, ProductRepository};
use crate::logging::API_REQUEST_LOG_TARGET;

/// Query mode describing the API itself, answered by the dispatcher
pub const INFO_QUERY_MODE: &str = "info";

/// Parameters of a versions query
#[derive(Debug, Clone, Default)]
pub struct VersionsQuery {
    pub licenses: Option<Vec<String>>,
    pub url: Option<String>,
}

impl VersionsQuery {
    pub fn new(licenses: Option<Vec<String>>, url: Option<String>) -> Self {
        Self { licenses, url }
    }

    /// License keys and requesting URL, when both were supplied.
    ///
    /// A request whose keys are all blank counts as unlicensed.
    pub fn license_params(&self) -> Option<(LicenseKeySet, &str)> {
        let url = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        let keys = LicenseKeySet::new(self.licenses.as_deref()?);
        if keys.is_empty() {
            return None;
        }
        Some((keys, url))
    }
}

/// Per-request switch deciding whether the request is written to the API request log
#[derive(Debug, Clone, Default)]
pub struct RequestLogScope {
    suppressed: Arc<AtomicUsize>,
}

impl RequestLogScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.suppressed.load(Ordering::SeqCst) == 0
    }

    /// Suppress logging until the returned guard is dropped
    pub fn suppress(&self) -> SuppressedLogging {
        self.suppressed.fetch_add(1, Ordering::SeqCst);
        SuppressedLogging {
            scope: self.clone(),
        }
    }
}

/// Restores request logging when dropped
#[derive(Debug)]
pub struct SuppressedLogging {
    scope: RequestLogScope,
}

impl Drop for SuppressedLogging {
    fn drop(&mut self) {
        self.scope.suppressed.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Summary returned by the `info` query mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiInfo {
    pub service: String,
    pub version: String,
    pub query_modes: Vec<String>,
}

/// Data produced by a query, before serialization
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    Empty,
    Info(ApiInfo),
    /// Legacy output without license parameters
    Versions(Vec<VersionRecord>),
    /// Legacy output with license parameters, keyed by product name
    NamedVersions(BTreeMap<String, VersionEntry>),
    /// versions-v2 output
    Responses(Vec<VersionResponse>),
}

/// Result of one output filter
pub struct FilterOutcome {
    pub data: QueryOutput,
    /// Held until the dispatcher has decided on request logging
    pub logging: Option<SuppressedLogging>,
}

impl FilterOutcome {
    pub fn passthrough(data: QueryOutput) -> Self {
        Self {
            data,
            logging: None,
        }
    }
}

/// Generic hook transforming the output of any query mode
#[async_trait]
pub trait OutputFilter: Send + Sync {
    /// Extra query modes this filter answers
    fn query_modes(&self) -> Vec<&'static str>;

    async fn filter(
        &self,
        data: QueryOutput,
        endpoint: &str,
        query: &VersionsQuery,
        scope: &RequestLogScope,
    ) -> Result<FilterOutcome, ApplicationError>;
}

/// Answers the `versions` and `versions-v2` query modes
pub struct VersionsEndpoint {
    products: Arc<dyn ProductRepository>,
    resolver: Arc<LicenseResolver>,
    builder: Arc<ResponseBuilder>,
    transients: Arc<CacheServiceWrapper>,
    response_ttl: Duration,
}

impl VersionsEndpoint {
    pub fn new(
        products: Arc<dyn ProductRepository>,
        resolver: Arc<LicenseResolver>,
        builder: Arc<ResponseBuilder>,
        transients: Arc<CacheServiceWrapper>,
        response_ttl: Duration,
    ) -> Self {
        Self {
            products,
            resolver,
            builder,
            transients,
            response_ttl,
        }
    }

    /// Legacy handler: versions read fresh, licensed products merged by name
    pub async fn versions_v1(&self, query: &VersionsQuery) -> Result<QueryOutput, ApplicationError> {
        let versions = self.products.list_versioned_products().await?;

        let Some((keys, site_url)) = query.license_params() else {
            return Ok(QueryOutput::Versions(versions));
        };

        let mut data: BTreeMap<String, VersionEntry> = versions
            .iter()
            .map(|v| (v.name.clone(), VersionEntry::Base(v.clone())))
            .collect();

        let licenses = self.resolver.resolve_licenses(&keys).await?;
        for version in &versions {
            let Some(license) = licenses.get(&version.download_id) else {
                continue;
            };
            let licensed = LicensedRequest { license, site_url };
            if let Some(response) = self
                .builder
                .build_response(version, Some(licensed), QueryMode::Versions)
                .await?
            {
                data.insert(version.name.clone(), VersionEntry::Licensed(Box::new(response)));
            }
        }

        Ok(QueryOutput::NamedVersions(data))
    }

    /// Cached handler: license-agnostic responses from the transient, then a
    /// package overlay for the requested licenses
    pub async fn versions_v2(&self, query: &VersionsQuery) -> Result<QueryOutput, ApplicationError> {
        let mut responses = self.base_responses().await?;

        let Some((keys, site_url)) = query.license_params() else {
            return Ok(QueryOutput::Responses(responses));
        };

        let licenses = self.resolver.resolve_licenses(&keys).await?;
        for response in responses.iter_mut() {
            let Some(license) = licenses.get(&response.download_id) else {
                continue;
            };
            self.builder
                .resolve_package(response.download_id, Some(LicensedRequest { license, site_url }))
                .await?
                .apply_to(response);
        }

        Ok(QueryOutput::Responses(responses))
    }

    async fn base_responses(&self) -> Result<Vec<VersionResponse>, ApplicationError> {
        if let Some(cached) = self
            .transients
            .get::<Vec<VersionResponse>>(VERSIONS_V2_TRANSIENT)
            .await?
        {
            debug!(count = cached.len(), "Serving versions-v2 base set from transient");
            return Ok(cached);
        }

        let versions = self.products.list_versioned_products().await?;
        let mut seen = HashSet::with_capacity(versions.len());
        let mut responses = Vec::with_capacity(versions.len());
        for version in &versions {
            if !seen.insert(version.download_id) {
                continue;
            }
            if let Some(response) = self
                .builder
                .build_response(version, None, QueryMode::VersionsV2)
                .await?
            {
                responses.push(response);
            }
        }

        self.transients
            .set(VERSIONS_V2_TRANSIENT, &responses, self.response_ttl)
            .await?;
        info!(count = responses.len(), "Rebuilt versions-v2 base set");
        Ok(responses)
    }
}

#[async_trait]
impl OutputFilter for VersionsEndpoint {
    fn query_modes(&self) -> Vec<&'static str> {
        QueryMode::ALL.iter().map(QueryMode::as_str).collect()
    }

    async fn filter(
        &self,
        data: QueryOutput,
        endpoint: &str,
        query: &VersionsQuery,
        scope: &RequestLogScope,
    ) -> Result<FilterOutcome, ApplicationError> {
        let Ok(mode) = endpoint.parse::<QueryMode>() else {
            return Ok(FilterOutcome::passthrough(data));
        };

        let logging = scope.suppress();
        let data = match mode {
            QueryMode::Versions => self.versions_v1(query).await?,
            QueryMode::VersionsV2 => self.versions_v2(query).await?,
        };

        Ok(FilterOutcome {
            data,
            logging: Some(logging),
        })
    }
}

/// One line of the API request log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLogEntry {
    pub endpoint: String,
    pub licensed: bool,
}

/// API request log kept by the dispatcher
#[derive(Debug, Default)]
pub struct ApiRequestLog {
    entries: Mutex<VecDeque<RequestLogEntry>>,
    capacity: usize,
}

impl ApiRequestLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record(&self, entry: RequestLogEntry) {
        info!(
            target: API_REQUEST_LOG_TARGET,
            endpoint = %entry.endpoint,
            licensed = entry.licensed,
            "API request"
        );
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if self.capacity > 0 && entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn entries(&self) -> Vec<RequestLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

/// Generic query-mode dispatch: validates the mode, runs the output filters and
/// writes the request log unless a filter suppressed it
pub struct QueryDispatcher {
    filters: Vec<Arc<dyn OutputFilter>>,
    request_log: Arc<ApiRequestLog>,
}

impl QueryDispatcher {
    pub fn new(request_log: Arc<ApiRequestLog>) -> Self {
        Self {
            filters: Vec::new(),
            request_log,
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn OutputFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Every accepted query mode
    pub fn query_modes(&self) -> Vec<String> {
        std::iter::once(INFO_QUERY_MODE)
            .chain(self.filters.iter().flat_map(|f| f.query_modes()))
            .map(str::to_string)
            .collect()
    }

    pub fn request_log(&self) -> &ApiRequestLog {
        &self.request_log
    }

    pub async fn dispatch(
        &self,
        endpoint: &str,
        query: &VersionsQuery,
    ) -> Result<QueryOutput, ApplicationError> {
        let modes = self.query_modes();
        if !modes.iter().any(|m| m == endpoint) {
            return Err(DomainError::InvalidQueryMode {
                mode: endpoint.to_string(),
            }
            .into());
        }

        let scope = RequestLogScope::new();
        let mut data = if endpoint == INFO_QUERY_MODE {
            QueryOutput::Info(ApiInfo {
                service: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                query_modes: modes,
            })
        } else {
            QueryOutput::Empty
        };

        let mut held = Vec::new();
        for filter in &self.filters {
            let outcome = filter.filter(data, endpoint, query, &scope).await?;
            data = outcome.data;
            held.extend(outcome.logging);
        }

        if scope.is_enabled() {
            self.request_log.record(RequestLogEntry {
                endpoint: endpoint.to_string(),
                licensed: query.license_params().is_some(),
            });
        } else {
            debug!(endpoint, "Request logging suppressed");
        }

        drop(held);
        Ok(data)
    }
}
