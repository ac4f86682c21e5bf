//! Versions API - latest product versions for software update clients
//!
//! This crate provides a Domain-Driven Design (DDD) architecture for serving
//! product versions, changelogs and signed package links to licensed sites.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;
pub mod presentation;

pub use config::Config;
pub use logging::init_tracing;

use axum::Router;
use std::sync::Arc;
use std::time::Instant;

use application::{
    ApiRequestLog, ApplicationError, CacheInvalidator, LicenseResolver, QueryDispatcher,
    ResponseBuilder, VersionsEndpoint,
};
use infrastructure::{
    CacheServiceWrapper, CatalogRepository, FileTransientStore, MemoryObjectCache,
    SignedUrlLicensing,
};
use presentation::{AppState, create_router};

/// Entries kept in the in-memory API request log
const REQUEST_LOG_CAPACITY: usize = 1_000;

/// Wire the store, caches and services described by `config`
pub async fn build_app_state(config: &Config) -> Result<AppState, ApplicationError> {
    let store = Arc::new(match &config.store.catalog_path {
        Some(path) => CatalogRepository::from_path(path).await?,
        None => {
            tracing::info!("No catalog configured, starting with an empty store");
            CatalogRepository::empty()
        }
    });

    let transients = Arc::new(CacheServiceWrapper::file(Arc::new(FileTransientStore::new(
        config.cache.directory.clone(),
    ))));
    let object_cache = Arc::new(CacheServiceWrapper::memory(Arc::new(MemoryObjectCache::new())));

    let resolver = Arc::new(LicenseResolver::new(
        store.clone(),
        object_cache.clone(),
        config.cache.license_ttl(),
    ));
    let licensing = Arc::new(SignedUrlLicensing::from_config(&config.licensing));
    let builder = Arc::new(ResponseBuilder::new(
        store.clone(),
        resolver.clone(),
        licensing,
    ));

    let endpoint = Arc::new(VersionsEndpoint::new(
        store.clone(),
        resolver,
        builder,
        transients.clone(),
        config.cache.response_ttl(),
    ));
    let dispatcher = QueryDispatcher::new(Arc::new(ApiRequestLog::new(REQUEST_LOG_CAPACITY)))
        .with_filter(endpoint);

    Ok(AppState {
        dispatcher: Arc::new(dispatcher),
        products: store,
        invalidator: Arc::new(CacheInvalidator::new(
            transients.clone(),
            object_cache.clone(),
        )),
        transients,
        object_cache,
        started_at: Instant::now(),
    })
}

/// Build the full HTTP application for `config`
pub async fn create_app(config: Config) -> Result<Router, ApplicationError> {
    let app_state = build_app_state(&config).await?;
    Ok(create_router(app_state, &config))
}
