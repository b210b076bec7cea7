//! Shipment carrier trait and simulated carriers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use common::CorrelationId;
use domain::OrderRequest;
use rand::Rng;

use crate::error::SagaError;

/// Receipt returned by a carrier that accepted a shipment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentReceipt {
    pub tracking_number: String,
}

/// External shipment provider. A call either ships the order or fails.
#[async_trait]
pub trait Carrier: Send + Sync {
    async fn ship(
        &self,
        correlation_id: CorrelationId,
        order: &OrderRequest,
    ) -> Result<ShipmentReceipt, SagaError>;
}

/// Deterministic carrier for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCarrier {
    fail_on_ship: Arc<AtomicBool>,
    shipped: Arc<AtomicU32>,
}

impl InMemoryCarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the carrier to reject every shipment.
    pub fn set_fail_on_ship(&self, fail: bool) {
        self.fail_on_ship.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of accepted shipments.
    pub fn shipment_count(&self) -> u32 {
        self.shipped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Carrier for InMemoryCarrier {
    async fn ship(
        &self,
        correlation_id: CorrelationId,
        _order: &OrderRequest,
    ) -> Result<ShipmentReceipt, SagaError> {
        if self.fail_on_ship.load(Ordering::SeqCst) {
            return Err(SagaError::Carrier("shipment rejected".to_string()));
        }

        let n = self.shipped.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ShipmentReceipt {
            tracking_number: format!("TRK-{n:04}-{}", short_id(correlation_id)),
        })
    }
}

/// Carrier that rejects a random share of shipments.
#[derive(Debug, Clone, Copy)]
pub struct FlakyCarrier {
    failure_rate: f64,
}

impl FlakyCarrier {
    /// Creates a carrier rejecting shipments with probability `failure_rate`,
    /// clamped to `[0, 1]`.
    pub fn new(failure_rate: f64) -> Self {
        let failure_rate = if failure_rate.is_nan() {
            0.0
        } else {
            failure_rate.clamp(0.0, 1.0)
        };
        Self { failure_rate }
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }
}

#[async_trait]
impl Carrier for FlakyCarrier {
    async fn ship(
        &self,
        correlation_id: CorrelationId,
        _order: &OrderRequest,
    ) -> Result<ShipmentReceipt, SagaError> {
        let rejected = rand::thread_rng().gen_bool(self.failure_rate);
        if rejected {
            return Err(SagaError::Carrier(
                "shipment provider rejected the order".to_string(),
            ));
        }

        Ok(ShipmentReceipt {
            tracking_number: format!("TRK-{}", short_id(correlation_id)),
        })
    }
}

fn short_id(correlation_id: CorrelationId) -> String {
    correlation_id.to_string().chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{ProductId, UserId};

    fn order() -> OrderRequest {
        OrderRequest::new(UserId::new(1), ProductId::new(1), 1).unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_carrier_counts_shipments() {
        let carrier = InMemoryCarrier::new();
        let receipt = carrier.ship(CorrelationId::new(), &order()).await.unwrap();

        assert!(receipt.tracking_number.starts_with("TRK-0001-"));
        assert_eq!(carrier.shipment_count(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_carrier_can_fail() {
        let carrier = InMemoryCarrier::new();
        carrier.set_fail_on_ship(true);

        let result = carrier.ship(CorrelationId::new(), &order()).await;
        assert!(matches!(result, Err(SagaError::Carrier(_))));
        assert_eq!(carrier.shipment_count(), 0);
    }

    #[tokio::test]
    async fn test_flaky_carrier_extremes() {
        let always = FlakyCarrier::new(1.0);
        let never = FlakyCarrier::new(0.0);

        for _ in 0..20 {
            assert!(always.ship(CorrelationId::new(), &order()).await.is_err());
            assert!(never.ship(CorrelationId::new(), &order()).await.is_ok());
        }
    }

    #[test]
    fn test_failure_rate_is_clamped() {
        assert_eq!(FlakyCarrier::new(3.0).failure_rate(), 1.0);
        assert_eq!(FlakyCarrier::new(-1.0).failure_rate(), 0.0);
        assert_eq!(FlakyCarrier::new(f64::NAN).failure_rate(), 0.0);
    }
}
