use serde::{Deserialize, Serialize};

use super::OrderError;
use super::value_objects::{ProductId, UserId};

/// A customer's request to buy a quantity of one product.
///
/// Immutable once built; embedded unchanged in every copy of the saga event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawOrderRequest")]
pub struct OrderRequest {
    user_id: UserId,
    product_id: ProductId,
    quantity: u32,
}

impl OrderRequest {
    /// Creates a new order request. The quantity must be positive.
    pub fn new(
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Self, OrderError> {
        if quantity == 0 {
            return Err(OrderError::InvalidQuantity { quantity });
        }
        Ok(Self {
            user_id,
            product_id,
            quantity,
        })
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }
}

#[derive(Deserialize)]
struct RawOrderRequest {
    user_id: UserId,
    product_id: ProductId,
    quantity: u32,
}

impl TryFrom<RawOrderRequest> for OrderRequest {
    type Error = OrderError;

    fn try_from(raw: RawOrderRequest) -> Result<Self, Self::Error> {
        OrderRequest::new(raw.user_id, raw.product_id, raw.quantity)
    }
}
