//! Order request and related value objects.

mod request;
mod value_objects;

pub use request::OrderRequest;
pub use value_objects::{Money, ProductId, UserId};

use thiserror::Error;

/// Errors that can occur when building an order request.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Invalid quantity.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },
}
