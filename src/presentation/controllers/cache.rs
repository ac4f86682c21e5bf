//! Cache management controller for admin endpoints

use axum::{extract::State, response::Json};
use chrono::Utc;
use tracing::info;

use crate::application::ApplicationError;
use crate::infrastructure::CacheSummary;
use crate::presentation::controllers::versions::AppState;
use crate::presentation::models::{CacheFlushResponse, CacheStatsResponse, CacheTierDto, ErrorResponse};

impl From<CacheSummary> for CacheTierDto {
    fn from(summary: CacheSummary) -> Self {
        Self {
            cache_type: summary.cache_type,
            hits: summary.hits,
            misses: summary.misses,
            hit_rate: summary.hit_rate,
            entries: summary.entries,
        }
    }
}

/// Get cache statistics
#[utoipa::path(
    get,
    path = "/api/v1/cache/stats",
    tag = "cache",
    responses(
        (status = 200, description = "Statistics of the transient store and object cache", body = CacheStatsResponse),
        (status = 500, description = "Cache failure", body = ErrorResponse)
    )
)]
pub async fn get_cache_stats(
    State(app_state): State<AppState>,
) -> Result<Json<CacheStatsResponse>, ApplicationError> {
    Ok(Json(CacheStatsResponse {
        transients: app_state.transients.summary().await?.into(),
        object_cache: app_state.object_cache.summary().await?.into(),
    }))
}

/// Drop the cached versions-v2 set and every cached license lookup
#[utoipa::path(
    post,
    path = "/api/v1/cache/flush",
    tag = "cache",
    responses(
        (status = 200, description = "Caches cleared", body = CacheFlushResponse),
        (status = 500, description = "Cache failure", body = ErrorResponse)
    )
)]
pub async fn flush_caches(
    State(app_state): State<AppState>,
) -> Result<Json<CacheFlushResponse>, ApplicationError> {
    app_state.invalidator.flush().await?;
    info!("Version caches flushed on request");

    Ok(Json(CacheFlushResponse {
        message: "Version caches cleared".to_string(),
        flushed_at: Utc::now(),
    }))
}
