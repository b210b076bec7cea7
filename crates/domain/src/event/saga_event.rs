use serde::{Deserialize, Serialize};

use common::CorrelationId;

use crate::error::DomainError;
use crate::event::{OrderOutcome, Stage, StageStatus};
use crate::order::OrderRequest;

/// The unit of work flowing on the order-processing topic.
///
/// A saga event carries the order together with one status per stage and an
/// append-only trace log. Every participant reads the whole vector to decide
/// whether the event is its turn, writes only its own stage status, and
/// republishes the result.
///
/// Two copies of the same saga compare by [`SagaEvent::same_saga`], never by
/// their fields, because every republication differs from the previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaEvent {
    correlation_id: CorrelationId,
    order: OrderRequest,
    outcome: OrderOutcome,
    balance_status: StageStatus,
    inventory_status: StageStatus,
    shipment_status: StageStatus,
    #[serde(default)]
    log: Vec<String>,
}

impl SagaEvent {
    /// Message type used when the event is put on the bus.
    pub const MESSAGE_TYPE: &'static str = "SagaEvent";

    /// Creates the initial `REQUESTED` event for an order with a fresh correlation ID.
    pub fn requested(order: OrderRequest) -> Self {
        Self::with_correlation_id(CorrelationId::new(), order)
    }

    /// Creates the initial `REQUESTED` event under a known correlation ID.
    pub fn with_correlation_id(correlation_id: CorrelationId, order: OrderRequest) -> Self {
        Self {
            correlation_id,
            order,
            outcome: OrderOutcome::Requested,
            balance_status: StageStatus::Unprocessed,
            inventory_status: StageStatus::Unprocessed,
            shipment_status: StageStatus::Unprocessed,
            log: Vec::new(),
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn order(&self) -> &OrderRequest {
        &self.order
    }

    pub fn outcome(&self) -> OrderOutcome {
        self.outcome
    }

    pub fn balance_status(&self) -> StageStatus {
        self.balance_status
    }

    pub fn inventory_status(&self) -> StageStatus {
        self.inventory_status
    }

    pub fn shipment_status(&self) -> StageStatus {
        self.shipment_status
    }

    /// Returns the status recorded for a stage.
    pub fn status(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::Balance => self.balance_status,
            Stage::Inventory => self.inventory_status,
            Stage::Shipment => self.shipment_status,
        }
    }

    /// Returns true if both events belong to the same saga instance.
    pub fn same_saga(&self, other: &SagaEvent) -> bool {
        self.correlation_id == other.correlation_id
    }

    // Log

    /// Appends a trace line. Lines are never reordered or deduplicated.
    pub fn append_log(&mut self, message: impl Into<String>) {
        self.log.push(message.into());
    }

    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Renders the log as newline-terminated lines.
    pub fn message(&self) -> String {
        self.log.iter().fold(String::new(), |mut acc, line| {
            acc.push_str(line);
            acc.push('\n');
            acc
        })
    }

    // Predicates

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_terminal()
    }

    pub fn due_for_balance(&self) -> bool {
        self.balance_status == StageStatus::Unprocessed
    }

    pub fn due_for_inventory(&self) -> bool {
        self.inventory_status == StageStatus::Unprocessed
            && self.balance_status == StageStatus::Success
    }

    pub fn due_for_shipment(&self) -> bool {
        self.shipment_status == StageStatus::Unprocessed
            && self.inventory_status == StageStatus::Success
    }

    /// The inventory stage reverted while the debit is still in place.
    pub fn balance_must_compensate(&self) -> bool {
        self.inventory_status == StageStatus::Revert && self.balance_status != StageStatus::Revert
    }

    /// The shipment stage reverted while the reservation is still in place.
    pub fn inventory_must_compensate(&self) -> bool {
        self.shipment_status == StageStatus::Revert
            && self.inventory_status != StageStatus::Revert
    }

    /// Returns true once nothing more will happen to this saga.
    ///
    /// A created order is settled immediately. A cancelled order is settled
    /// when no stage is left holding a successful local transaction.
    pub fn is_settled(&self) -> bool {
        match self.outcome {
            OrderOutcome::Requested => false,
            OrderOutcome::Created => true,
            OrderOutcome::Cancelled => Stage::ALL
                .iter()
                .all(|stage| self.status(*stage) != StageStatus::Success),
        }
    }

    // Mutations

    /// Records a new status for a stage.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidStageTransition`] if the change would
    /// regress the stage.
    pub fn record(&mut self, stage: Stage, status: StageStatus) -> Result<(), DomainError> {
        let current = self.status(stage);
        if !current.can_transition_to(status) {
            return Err(DomainError::InvalidStageTransition {
                stage,
                from: current,
                to: status,
            });
        }

        match stage {
            Stage::Balance => self.balance_status = status,
            Stage::Inventory => self.inventory_status = status,
            Stage::Shipment => self.shipment_status = status,
        }
        Ok(())
    }

    /// Marks the order as created. Every stage must already be `SUCCESS`.
    pub fn complete(&mut self) -> Result<(), DomainError> {
        self.transition_outcome(OrderOutcome::Created)?;

        if let Some(stage) = Stage::ALL
            .into_iter()
            .find(|stage| self.status(*stage) != StageStatus::Success)
        {
            return Err(DomainError::StageNotSucceeded {
                stage,
                status: self.status(stage),
            });
        }

        self.outcome = OrderOutcome::Created;
        Ok(())
    }

    /// Marks the order as cancelled. Cancelling twice is a no-op.
    pub fn cancel(&mut self) -> Result<(), DomainError> {
        self.transition_outcome(OrderOutcome::Cancelled)?;
        self.outcome = OrderOutcome::Cancelled;
        Ok(())
    }

    fn transition_outcome(&self, next: OrderOutcome) -> Result<(), DomainError> {
        if self.outcome.can_transition_to(next) {
            Ok(())
        } else {
            Err(DomainError::InvalidOutcomeTransition {
                from: self.outcome,
                to: next,
            })
        }
    }
}
