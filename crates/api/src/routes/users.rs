//! User balance listing.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use saga::Account;

use crate::AppState;
use crate::error::ApiError;

/// GET /users: every account with its current balance.
#[tracing::instrument(skip(state))]
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Account>>, ApiError> {
    let accounts = state.balances.list_accounts().await?;
    Ok(Json(accounts))
}
