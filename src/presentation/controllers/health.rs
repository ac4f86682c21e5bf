//! Health check controller

use axum::{extract::State, http::StatusCode, response::Json};
use chrono::Utc;
use serde_json::json;

use crate::presentation::controllers::versions::AppState;
use crate::presentation::models::HealthResponse;

/// Basic health check with cache statistics and build information
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Cache tier unavailable", body = HealthResponse)
    )
)]
pub async fn health_check(
    State(app_state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let mut overall_status = "healthy";
    let mut caches = serde_json::Map::new();

    for (name, cache) in [
        ("transients", &app_state.transients),
        ("object_cache", &app_state.object_cache),
    ] {
        match cache.summary().await {
            Ok(summary) => {
                caches.insert(name.to_string(), json!(summary));
            }
            Err(e) => {
                overall_status = "degraded";
                caches.insert(
                    name.to_string(),
                    json!({ "status": "unhealthy", "message": e.to_string() }),
                );
            }
        }
    }

    let response = HealthResponse {
        status: overall_status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        details: Some(json!({
            "caches": caches,
            "uptime_seconds": app_state.started_at.elapsed().as_secs(),
            "build_info": {
                "version": env!("CARGO_PKG_VERSION"),
                "build_date": option_env!("VERGEN_BUILD_DATE").unwrap_or("unknown"),
                "git_sha": option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
            }
        })),
    };

    if overall_status == "healthy" {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

/// Kubernetes liveness probe endpoint
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Service is alive")
    )
)]
pub async fn liveness_probe() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness probe endpoint
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready to accept traffic"),
        (status = 503, description = "Transient store is not readable")
    )
)]
pub async fn readiness_probe(State(app_state): State<AppState>) -> StatusCode {
    match app_state.transients.size().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
