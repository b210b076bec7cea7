//! Inventory participant: reserves stock and releases it on compensation.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{OrderRequest, SagaEvent, Stage, StageStatus};

use crate::error::SagaError;
use crate::order_fulfillment::GROUP_INVENTORY;
use crate::participant::Participant;
use crate::participants::handled::{HandledSagas, Step};
use crate::retry::{RetryPolicy, compensate_with_retry};
use crate::services::StockLedger;

/// Second stage of the forward chain.
///
/// Its own failure triggers the balance compensation; a shipment failure
/// triggers its compensation.
pub struct InventoryParticipant {
    stock: Arc<dyn StockLedger>,
    retry: RetryPolicy,
    handled: HandledSagas,
}

impl InventoryParticipant {
    pub fn new(stock: Arc<dyn StockLedger>) -> Self {
        Self {
            stock,
            retry: RetryPolicy::default(),
            handled: HandledSagas::default(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn reserve(&self, order: &OrderRequest) -> Result<u32, SagaError> {
        let product_id = order.product_id();
        let available = self
            .stock
            .get_stock(product_id)
            .await?
            .ok_or(SagaError::UnknownProduct(product_id))?;

        if available < order.quantity() {
            return Err(SagaError::InsufficientStock {
                product_id,
                requested: order.quantity(),
                available,
            });
        }

        self.stock
            .adjust_stock(product_id, -i64::from(order.quantity()))
            .await
    }

    async fn process(&self, mut event: SagaEvent) -> Result<SagaEvent, SagaError> {
        let correlation_id = event.correlation_id();
        tracing::info!(
            %correlation_id,
            product_id = %event.order().product_id(),
            "order should be processed for product"
        );

        match self.reserve(event.order()).await {
            Ok(remaining) => {
                event.record(Stage::Inventory, StageStatus::Success)?;
                event.append_log("Warehouse service successfully processed the order");
                metrics::counter!("saga_stage_success_total", "stage" => "inventory")
                    .increment(1);
                tracing::info!(%correlation_id, remaining, "stock reserved");
            }
            Err(e) => {
                tracing::warn!(%correlation_id, error = %e, "stock reservation failed");
                event.record(Stage::Inventory, StageStatus::Revert)?;
                event.cancel()?;
                event.append_log(format!("Issue occurred during qty decreasing: {e}"));
                metrics::counter!("saga_stage_failure_total", "stage" => "inventory")
                    .increment(1);
            }
        }
        Ok(event)
    }

    async fn revert(&self, mut event: SagaEvent) -> Result<SagaEvent, SagaError> {
        let correlation_id = event.correlation_id();
        let order = *event.order();
        tracing::warn!(%correlation_id, "order event should be reverted");

        let (restocked, attempts) = compensate_with_retry(
            self.retry,
            Stage::Inventory,
            correlation_id,
            move || async move {
                self.stock
                    .adjust_stock(order.product_id(), i64::from(order.quantity()))
                    .await
            },
        )
        .await?;

        event.record(Stage::Inventory, StageStatus::Revert)?;
        event.cancel()?;
        event.append_log("Reverting QTY decreasing");
        metrics::counter!("saga_compensations_total", "stage" => "inventory").increment(1);
        tracing::info!(%correlation_id, restocked, attempts, "stock restored");
        Ok(event)
    }
}

#[async_trait]
impl Participant for InventoryParticipant {
    fn name(&self) -> &'static str {
        "inventory"
    }

    fn consumer_group(&self) -> &'static str {
        GROUP_INVENTORY
    }

    async fn handle(&self, event: SagaEvent) -> Result<Option<SagaEvent>, SagaError> {
        let correlation_id = event.correlation_id();
        let step = if !event.is_terminal() && event.due_for_inventory() {
            Step::Forward
        } else if event.inventory_must_compensate() {
            Step::Compensate
        } else {
            return Ok(None);
        };

        if self.handled.contains(correlation_id, step).await {
            tracing::debug!(%correlation_id, ?step, "duplicate delivery ignored");
            return Ok(None);
        }

        let next = match step {
            Step::Forward => self.process(event).await?,
            Step::Compensate => self.revert(event).await?,
        };
        self.handled.mark(correlation_id, step).await;
        Ok(Some(next))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use domain::{OrderOutcome, ProductId, UserId};

    use super::*;
    use crate::services::InMemoryWarehouse;

    fn participant(warehouse: &InMemoryWarehouse) -> InventoryParticipant {
        InventoryParticipant::new(Arc::new(warehouse.clone()))
            .with_retry_policy(RetryPolicy::new().with_delay(Duration::ZERO))
    }

    /// An event whose balance stage already succeeded.
    fn paid(product: u32, quantity: u32) -> SagaEvent {
        let order = OrderRequest::new(UserId::new(1), ProductId::new(product), quantity).unwrap();
        let mut event = SagaEvent::requested(order);
        event.record(Stage::Balance, StageStatus::Success).unwrap();
        event
    }

    async fn stock(warehouse: &InMemoryWarehouse, product: u32) -> u32 {
        warehouse
            .get_stock(ProductId::new(product))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_waits_for_balance() {
        let warehouse = InMemoryWarehouse::seeded();
        let order = OrderRequest::new(UserId::new(1), ProductId::new(1), 1).unwrap();

        let result = participant(&warehouse)
            .handle(SagaEvent::requested(order))
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(stock(&warehouse, 1).await, 10);
    }

    #[tokio::test]
    async fn test_reserves_stock() {
        let warehouse = InMemoryWarehouse::seeded();
        let event = participant(&warehouse)
            .handle(paid(1, 1))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(event.inventory_status(), StageStatus::Success);
        assert_eq!(event.outcome(), OrderOutcome::Requested);
        assert_eq!(stock(&warehouse, 1).await, 9);
    }

    #[tokio::test]
    async fn test_insufficient_stock_reverts_stage() {
        let warehouse = InMemoryWarehouse::seeded();
        let event = participant(&warehouse)
            .handle(paid(2, 5))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(event.inventory_status(), StageStatus::Revert);
        assert_eq!(event.outcome(), OrderOutcome::Cancelled);
        assert!(event.balance_must_compensate());
        assert_eq!(stock(&warehouse, 2).await, 1);
    }

    #[tokio::test]
    async fn test_compensates_after_shipment_failure() {
        let warehouse = InMemoryWarehouse::seeded();
        let participant = participant(&warehouse);

        let mut event = participant.handle(paid(1, 3)).await.unwrap().unwrap();
        assert_eq!(stock(&warehouse, 1).await, 7);

        event.record(Stage::Shipment, StageStatus::Revert).unwrap();
        event.cancel().unwrap();
        warehouse.fail_next_adjustments(2);

        let reverted = participant.handle(event).await.unwrap().unwrap();
        assert_eq!(reverted.inventory_status(), StageStatus::Revert);
        assert!(reverted.balance_must_compensate());
        assert_eq!(reverted.log().last().unwrap(), "Reverting QTY decreasing");
        assert_eq!(stock(&warehouse, 1).await, 10);
    }
}
