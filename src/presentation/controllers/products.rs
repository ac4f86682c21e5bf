//! Product admin controller

use axum::{
    extract::{Path, State},
    response::Json,
};
use tracing::info;

use crate::application::errors::ApplicationError;
use crate::infrastructure::ProductRepository;
use crate::presentation::controllers::versions::AppState;
use crate::presentation::models::{ErrorResponse, ProductRequest, ProductResponse};

/// Fetch one product from the store
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    tag = "products",
    params(("id" = i64, Path, description = "Product id")),
    responses(
        (status = 200, description = "Stored product", body = ProductResponse),
        (status = 404, description = "Unknown product", body = ErrorResponse)
    )
)]
pub async fn get_product(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ProductResponse>, ApplicationError> {
    let product = app_state
        .products
        .get_product(id)
        .await?
        .ok_or_else(|| ApplicationError::NotFound {
            resource: "product".to_string(),
            id: id.to_string(),
        })?;
    Ok(Json(ProductResponse::new(product, false)))
}

/// Create or replace a product. Saving a `download` clears the version caches.
#[utoipa::path(
    put,
    path = "/api/v1/products/{id}",
    tag = "products",
    params(("id" = i64, Path, description = "Product id")),
    request_body = ProductRequest,
    responses(
        (status = 200, description = "Saved product", body = ProductResponse),
        (status = 400, description = "Malformed product", body = ErrorResponse),
        (status = 500, description = "Store or cache failure", body = ErrorResponse)
    )
)]
pub async fn save_product(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<ProductRequest>,
) -> Result<Json<ProductResponse>, ApplicationError> {
    let saved = app_state
        .products
        .save_product(request.into_product(id))
        .await?;
    let caches_cleared = app_state.invalidator.on_product_saved(&saved.post_type).await?;

    info!(
        product_id = saved.id,
        post_type = %saved.post_type,
        caches_cleared,
        "Product saved"
    );
    Ok(Json(ProductResponse::new(saved, caches_cleared)))
}
