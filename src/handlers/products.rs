//! Product catalog HTTP handlers.
//!
//! - POST /api/v1/products - Register a product name
//! - GET /api/v1/products/{product_id} - Look a product up

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    app::AppState,
    error::AppError,
    models::product::{CreateProductRequest, Product},
};

/// Create a product.
///
/// ```json
/// { "name": "Delivery" }
/// ```
pub async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let product = state.products.create(request).await?;

    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Product>, AppError> {
    let product = state.products.get(product_id).await?;

    Ok(Json(product))
}
