//! Order intake endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use domain::{DomainError, OrderRequest, ProductId, UserId};
use saga::OrderResponse;
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct SubmitOrderRequest {
    pub user_id: u32,
    pub product_id: u32,
    pub quantity: u32,
}

/// POST /orders: run the fulfillment saga and wait for its outcome.
///
/// A cancelled order is still a `200`: the saga finished, the response says how.
#[tracing::instrument(skip(state))]
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = OrderRequest::new(
        UserId::new(req.user_id),
        ProductId::new(req.product_id),
        req.quantity,
    )
    .map_err(DomainError::from)?;

    let response = state.gateway.submit(order).await?;
    Ok(Json(response))
}
