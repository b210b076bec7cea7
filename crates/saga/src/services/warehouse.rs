//! Catalog and stock ledger traits with an in-memory warehouse.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use domain::{Money, ProductId};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::SagaError;

/// A catalog entry with its current stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(rename = "price_cents")]
    pub price: Money,
    pub stock_qty: u32,
}

impl Product {
    pub fn new(id: ProductId, name: impl Into<String>, price: Money, stock_qty: u32) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            stock_qty,
        }
    }
}

/// Read-only product and pricing lookup.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Returns a product, or `None` if it is not in the catalog.
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>, SagaError>;

    /// Lists every product ordered by ID.
    async fn list_products(&self) -> Result<Vec<Product>, SagaError>;
}

/// Read/adjust capability over stock quantities.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Returns the quantity in stock, or `None` for an unknown product.
    async fn get_stock(&self, product_id: ProductId) -> Result<Option<u32>, SagaError>;

    /// Adds `delta` (negative to reserve) to the stock and returns the new quantity.
    ///
    /// An adjustment that would make the stock negative is rejected and leaves
    /// the stock unchanged.
    async fn adjust_stock(&self, product_id: ProductId, delta: i64) -> Result<u32, SagaError>;
}

/// In-memory catalog and stock ledger.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWarehouse {
    products: Arc<RwLock<BTreeMap<ProductId, Product>>>,
    failures_left: Arc<AtomicU32>,
}

impl InMemoryWarehouse {
    /// Creates an empty warehouse.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a warehouse stocking the given products.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        Self {
            products: Arc::new(RwLock::new(
                products.into_iter().map(|p| (p.id, p)).collect(),
            )),
            failures_left: Arc::default(),
        }
    }

    /// Creates a warehouse with the demo catalog.
    pub fn seeded() -> Self {
        Self::with_products([
            Product::new(ProductId::new(1), "pen", Money::from_cents(150), 10),
            Product::new(ProductId::new(2), "iPhone", Money::from_dollars(1500), 1),
        ])
    }

    /// Makes the next `count` stock adjustments fail without touching any stock.
    pub fn fail_next_adjustments(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Catalog for InMemoryWarehouse {
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>, SagaError> {
        Ok(self.products.read().await.get(&product_id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>, SagaError> {
        Ok(self.products.read().await.values().cloned().collect())
    }
}

#[async_trait]
impl StockLedger for InMemoryWarehouse {
    async fn get_stock(&self, product_id: ProductId) -> Result<Option<u32>, SagaError> {
        Ok(self
            .products
            .read()
            .await
            .get(&product_id)
            .map(|p| p.stock_qty))
    }

    async fn adjust_stock(&self, product_id: ProductId, delta: i64) -> Result<u32, SagaError> {
        if self.take_injected_failure() {
            return Err(SagaError::StockLedger(format!(
                "adjustment for product {product_id} rejected"
            )));
        }

        let mut products = self.products.write().await;
        let product = products
            .get_mut(&product_id)
            .ok_or(SagaError::UnknownProduct(product_id))?;

        let updated = i64::from(product.stock_qty)
            .checked_add(delta)
            .ok_or_else(|| SagaError::StockLedger("stock overflow".to_string()))?;
        if updated < 0 {
            return Err(SagaError::InsufficientStock {
                product_id,
                requested: u32::try_from(delta.unsigned_abs()).unwrap_or(u32::MAX),
                available: product.stock_qty,
            });
        }
        let updated = u32::try_from(updated)
            .map_err(|_| SagaError::StockLedger("stock overflow".to_string()))?;

        product.stock_qty = updated;
        Ok(updated)
    }
}
