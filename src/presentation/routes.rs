//! Route definitions and server setup

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{Config, ServerConfig};
use crate::presentation::{
    controllers::{
        AppState, flush_caches, get_cache_stats, get_product, health_check, liveness_probe,
        query_endpoint, query_endpoint_post, readiness_probe, save_product,
    },
    middleware::logging_middleware,
    models::*,
};

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::presentation::controllers::versions::query_endpoint,
        crate::presentation::controllers::versions::query_endpoint_post,
        crate::presentation::controllers::products::get_product,
        crate::presentation::controllers::products::save_product,
        crate::presentation::controllers::cache::get_cache_stats,
        crate::presentation::controllers::cache::flush_caches,
        crate::presentation::controllers::health::health_check,
        crate::presentation::controllers::health::liveness_probe,
        crate::presentation::controllers::health::readiness_probe
    ),
    components(
        schemas(
            VersionsRequest,
            LicenseList,
            ProductRequest,
            ProductResponse,
            CacheTierDto,
            CacheStatsResponse,
            CacheFlushResponse,
            ErrorResponse,
            HealthResponse
        )
    ),
    tags(
        (name = "versions", description = "Product version lookups for update clients"),
        (name = "products", description = "Product store administration"),
        (name = "cache", description = "Version cache inspection and invalidation"),
        (name = "health", description = "System health monitoring endpoints")
    ),
    info(
        title = "Versions API",
        version = "0.2.0",
        description = "Latest product versions for software update clients, with signed package links for licensed sites.",
        license(
            name = "GPL-2.0-or-later",
            url = "https://www.gnu.org/licenses/old-licenses/gpl-2.0.html"
        )
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    )
)]
pub struct ApiDoc;

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins = if server.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            server
                .allowed_origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                        None
                    }
                }),
        )
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}

/// Create the application router with the middleware stack
pub fn create_router(app_state: AppState, config: &Config) -> Router {
    let api_routes = Router::new()
        .route("/products/{id}", get(get_product).put(save_product))
        .route("/cache/stats", get(get_cache_stats))
        .route("/cache/flush", post(flush_caches));

    let health_routes = Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe));

    let mut router = Router::new()
        .route(
            "/edd-api/{query}",
            get(query_endpoint).post(query_endpoint_post),
        )
        .nest("/api/v1", api_routes)
        .merge(health_routes);

    if config.server.enable_docs {
        router =
            router.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    }

    router
        .layer(
            ServiceBuilder::new()
                // HTTP tracing
                .layer(TraceLayer::new_for_http())
                // CORS handling
                .layer(cors_layer(&config.server))
                // Request timeout
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.server.request_timeout_seconds,
                )))
                // Custom logging middleware
                .layer(middleware::from_fn(logging_middleware)),
        )
        .with_state(app_state)
}
