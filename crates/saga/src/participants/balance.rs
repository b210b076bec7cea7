//! Balance participant: debits the user and re-credits on compensation.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{Money, OrderRequest, SagaEvent, Stage, StageStatus};

use crate::error::SagaError;
use crate::order_fulfillment::GROUP_BALANCE;
use crate::participant::Participant;
use crate::participants::handled::{HandledSagas, Step};
use crate::retry::{RetryPolicy, compensate_with_retry};
use crate::services::{BalanceLedger, Catalog};

/// First stage of the forward chain and last stage of the compensation chain.
pub struct BalanceParticipant {
    balances: Arc<dyn BalanceLedger>,
    catalog: Arc<dyn Catalog>,
    retry: RetryPolicy,
    handled: HandledSagas,
}

impl BalanceParticipant {
    pub fn new(balances: Arc<dyn BalanceLedger>, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            balances,
            catalog,
            retry: RetryPolicy::default(),
            handled: HandledSagas::default(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Price of the whole order at the current catalog price.
    async fn order_price(&self, order: &OrderRequest) -> Result<Money, SagaError> {
        let product = self
            .catalog
            .get_product(order.product_id())
            .await?
            .ok_or(SagaError::UnknownProduct(order.product_id()))?;

        product
            .price
            .checked_multiply(order.quantity())
            .ok_or_else(|| SagaError::BalanceLedger("order price overflow".to_string()))
    }

    async fn debit(&self, order: &OrderRequest) -> Result<Money, SagaError> {
        let user_id = order.user_id();
        let price = self.order_price(order).await?;
        let available = self
            .balances
            .get_balance(user_id)
            .await?
            .ok_or(SagaError::UnknownUser(user_id))?;

        if available < price {
            return Err(SagaError::InsufficientFunds {
                user_id,
                required: price,
                available,
            });
        }

        self.balances.adjust_balance(user_id, -price).await?;
        Ok(price)
    }

    async fn process(&self, mut event: SagaEvent) -> Result<SagaEvent, SagaError> {
        let correlation_id = event.correlation_id();
        tracing::info!(
            %correlation_id,
            user_id = %event.order().user_id(),
            "order should be processed for user"
        );

        match self.debit(event.order()).await {
            Ok(price) => {
                event.record(Stage::Balance, StageStatus::Success)?;
                event.append_log("Order was successfully processed for user");
                metrics::counter!("saga_stage_success_total", "stage" => "balance").increment(1);
                tracing::info!(%correlation_id, %price, "balance decreased");
            }
            Err(e) => {
                tracing::warn!(%correlation_id, error = %e, "balance decreasing failed");
                event.record(Stage::Balance, StageStatus::Revert)?;
                event.cancel()?;
                event.append_log(format!("Issue occurred during balance decreasing: {e}"));
                metrics::counter!("saga_stage_failure_total", "stage" => "balance").increment(1);
            }
        }
        Ok(event)
    }

    async fn revert(&self, mut event: SagaEvent) -> Result<SagaEvent, SagaError> {
        let correlation_id = event.correlation_id();
        let order = *event.order();
        tracing::warn!(%correlation_id, "order event should be reverted");

        let (refund, attempts) =
            compensate_with_retry(self.retry, Stage::Balance, correlation_id, move || async move {
                let price = self.order_price(&order).await?;
                self.balances.adjust_balance(order.user_id(), price).await?;
                Ok(price)
            })
            .await?;

        event.record(Stage::Balance, StageStatus::Revert)?;
        event.cancel()?;
        event.append_log("Reverting balance decreasing");
        metrics::counter!("saga_compensations_total", "stage" => "balance").increment(1);
        tracing::info!(%correlation_id, %refund, attempts, "balance restored");
        Ok(event)
    }
}

#[async_trait]
impl Participant for BalanceParticipant {
    fn name(&self) -> &'static str {
        "balance"
    }

    fn consumer_group(&self) -> &'static str {
        GROUP_BALANCE
    }

    async fn handle(&self, event: SagaEvent) -> Result<Option<SagaEvent>, SagaError> {
        let correlation_id = event.correlation_id();
        let step = if !event.is_terminal() && event.due_for_balance() {
            Step::Forward
        } else if event.balance_must_compensate() {
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
