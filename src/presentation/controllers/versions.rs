//! Query dispatch controller for the versions endpoint

use axum::{
    extract::{Path, State},
    response::Json,
};
use std::sync::Arc;
use std::time::Instant;

use crate::application::{CacheInvalidator, QueryDispatcher, QueryOutput, errors::ApplicationError};
use crate::infrastructure::{CacheServiceWrapper, ProductRepository};
use crate::presentation::middleware::VersionsParams;
use crate::presentation::models::{ErrorResponse, VersionsRequest};

/// Application state containing services
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<QueryDispatcher>,
    pub products: Arc<dyn ProductRepository>,
    pub invalidator: Arc<CacheInvalidator>,
    pub transients: Arc<CacheServiceWrapper>,
    pub object_cache: Arc<CacheServiceWrapper>,
    pub started_at: Instant,
}

/// Run a query mode of the store API
#[utoipa::path(
    get,
    path = "/edd-api/{query}",
    tag = "versions",
    params(
        ("query" = String, Path, description = "Query mode: versions, versions-v2 or info"),
        ("licenses" = Option<String>, Query, description = "Comma separated license keys"),
        ("url" = Option<String>, Query, description = "URL of the requesting site")
    ),
    responses(
        (status = 200, description = "Version information; an array for versions-v2 and unlicensed versions, an object keyed by product name for licensed versions", content_type = "application/json"),
        (status = 400, description = "Unknown query mode or malformed parameters", body = ErrorResponse),
        (status = 500, description = "Store or cache failure", body = ErrorResponse)
    )
)]
pub async fn query_endpoint(
    State(app_state): State<AppState>,
    Path(query): Path<String>,
    VersionsParams(params): VersionsParams,
) -> Result<Json<QueryOutput>, ApplicationError> {
    tracing::debug!(
        query = %query,
        licensed = params.license_params().is_some(),
        "Dispatching store API query"
    );
    let output = app_state.dispatcher.dispatch(&query, &params).await?;
    Ok(Json(output))
}

/// POST variant of [`query_endpoint`] accepting JSON or form bodies
#[utoipa::path(
    post,
    path = "/edd-api/{query}",
    tag = "versions",
    params(
        ("query" = String, Path, description = "Query mode: versions, versions-v2 or info")
    ),
    request_body(content = VersionsRequest, description = "License keys and requesting site"),
    responses(
        (status = 200, description = "Version information", content_type = "application/json"),
        (status = 400, description = "Unknown query mode or malformed body", body = ErrorResponse)
    )
)]
pub async fn query_endpoint_post(
    state: State<AppState>,
    path: Path<String>,
    params: VersionsParams,
) -> Result<Json<QueryOutput>, ApplicationError> {
    query_endpoint(state, path, params).await
}
