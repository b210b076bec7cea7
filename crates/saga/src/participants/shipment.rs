//! Shipment participant: the last forward stage and the only one that creates the order.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{SagaEvent, Stage, StageStatus};

use crate::error::SagaError;
use crate::order_fulfillment::GROUP_SHIPMENT;
use crate::participant::Participant;
use crate::participants::handled::{HandledSagas, Step};
use crate::services::Carrier;

pub struct ShipmentParticipant {
    carrier: Arc<dyn Carrier>,
    handled: HandledSagas,
}

impl ShipmentParticipant {
    pub fn new(carrier: Arc<dyn Carrier>) -> Self {
        Self {
            carrier,
            handled: HandledSagas::default(),
        }
    }

    async fn process(&self, mut event: SagaEvent) -> Result<SagaEvent, SagaError> {
        let correlation_id = event.correlation_id();
        tracing::info!(
            %correlation_id,
            user_id = %event.order().user_id(),
            "order should be applied for shipment"
        );

        match self.carrier.ship(correlation_id, event.order()).await {
            Ok(receipt) => {
                event.record(Stage::Shipment, StageStatus::Success)?;
                event.complete()?;
                event.append_log(format!(
                    "Order was shipped (tracking number {})",
                    receipt.tracking_number
                ));
                metrics::counter!("saga_stage_success_total", "stage" => "shipment").increment(1);
                metrics::counter!("saga_orders_created_total").increment(1);
                tracing::info!(
                    %correlation_id,
                    tracking_number = %receipt.tracking_number,
                    "order shipped"
                );
            }
            Err(e) => {
                tracing::warn!(%correlation_id, error = %e, "shipment failed");
                event.record(Stage::Shipment, StageStatus::Revert)?;
                event.cancel()?;
                event.append_log(
                    "Exception happened during applying order for the shipment. \
                     Shipment provider caused this issue",
                );
                metrics::counter!("saga_stage_failure_total", "stage" => "shipment").increment(1);
            }
        }
        Ok(event)
    }
}

#[async_trait]
impl Participant for ShipmentParticipant {
    fn name(&self) -> &'static str {
        "shipment"
    }

    fn consumer_group(&self) -> &'static str {
        GROUP_SHIPMENT
    }

    async fn handle(&self, event: SagaEvent) -> Result<Option<SagaEvent>, SagaError> {
        if event.is_terminal() || !event.due_for_shipment() {
            return Ok(None);
        }

        let correlation_id = event.correlation_id();
        if self.handled.contains(correlation_id, Step::Forward).await {
            tracing::debug!(%correlation_id, "duplicate delivery ignored");
            return Ok(None);
        }

        let next = self.process(event).await?;
        self.handled.mark(correlation_id, Step::Forward).await;
        Ok(Some(next))
    }
}
