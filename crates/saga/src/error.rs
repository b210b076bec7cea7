//! Saga error types.

use common::CorrelationId;
use domain::{DomainError, Money, ProductId, Stage, UserId};
use event_bus::EventBusError;
use thiserror::Error;

/// Errors that can occur while running the saga.
///
/// Most variants describe a failed local step. Participants absorb those into
/// the event's status vector and log. Only the variants for which
/// [`SagaError::is_fatal`] returns true escape a handler.
#[derive(Debug, Error)]
pub enum SagaError {
    /// No account exists for the user.
    #[error("Unknown user: {0}")]
    UnknownUser(UserId),

    /// The product is not in the catalog.
    #[error("Unknown product: {0}")]
    UnknownProduct(ProductId),

    /// The user cannot pay for the order.
    #[error("Insufficient balance for user {user_id}: required {required}, available {available}")]
    InsufficientFunds {
        user_id: UserId,
        required: Money,
        available: Money,
    },

    /// The warehouse cannot cover the ordered quantity.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The balance ledger rejected an adjustment.
    #[error("Balance ledger error: {0}")]
    BalanceLedger(String),

    /// The stock ledger rejected an adjustment.
    #[error("Stock ledger error: {0}")]
    StockLedger(String),

    /// The carrier refused the shipment.
    #[error("Carrier error: {0}")]
    Carrier(String),

    /// A compensating transaction kept failing until the retry budget ran out.
    #[error(
        "Reverting {stage} failed for saga {correlation_id} after {attempts} attempts: {last_error}"
    )]
    CompensationExhausted {
        stage: Stage,
        correlation_id: CorrelationId,
        attempts: u32,
        last_error: String,
    },

    /// No terminal event arrived before the wait ceiling.
    #[error("No result for saga {correlation_id} after {attempts} attempts")]
    WaitTimeout {
        correlation_id: CorrelationId,
        attempts: u32,
    },

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Event bus error.
    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaError {
    /// Returns true for the conditions that must not be absorbed into the event.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SagaError::CompensationExhausted { .. } | SagaError::WaitTimeout { .. }
        )
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
