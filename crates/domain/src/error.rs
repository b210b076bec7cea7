//! Domain error types.

use thiserror::Error;

use crate::event::{OrderOutcome, Stage, StageStatus};
use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An order request was invalid.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// A stage status would regress.
    #[error("Invalid {stage} status transition: {from} -> {to}")]
    InvalidStageTransition {
        stage: Stage,
        from: StageStatus,
        to: StageStatus,
    },

    /// The order outcome would leave a terminal state.
    #[error("Invalid outcome transition: {from} -> {to}")]
    InvalidOutcomeTransition {
        from: OrderOutcome,
        to: OrderOutcome,
    },

    /// The order cannot be created while a stage has not succeeded.
    #[error("Cannot create order: {stage} stage is {status}")]
    StageNotSucceeded { stage: Stage, status: StageStatus },
}
