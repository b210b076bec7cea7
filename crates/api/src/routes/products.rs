//! Warehouse catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::ProductId;
use saga::Product;

use crate::AppState;
use crate::error::ApiError;

/// GET /warehouse/products/available: the catalog with stock levels.
#[tracing::instrument(skip(state))]
pub async fn available(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products = state.catalog.list_products().await?;
    Ok(Json(products))
}

/// GET /warehouse/products/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
) -> Result<Json<Product>, ApiError> {
    state
        .catalog
        .get_product(ProductId::new(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))
}
