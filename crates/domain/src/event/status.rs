//! Stage and outcome state machines.

use serde::{Deserialize, Serialize};

/// One participant's unit of work within the saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Balance,
    Inventory,
    Shipment,
}

impl Stage {
    /// All stages in forward-chain order.
    pub const ALL: [Stage; 3] = [Stage::Balance, Stage::Inventory, Stage::Shipment];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Balance => "balance",
            Stage::Inventory => "inventory",
            Stage::Shipment => "shipment",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress of a single stage.
///
/// State transitions:
/// ```text
/// UNPROCESSED ──┬──► SUCCESS ──► REVERT
///               └──────────────► REVERT
/// ```
/// `REVERT` is terminal for the stage; nothing returns to `UNPROCESSED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    /// The stage has not acted on this saga yet.
    #[default]
    Unprocessed,

    /// The stage committed its local transaction.
    Success,

    /// The stage failed, or compensated a previous success.
    Revert,
}

impl StageStatus {
    /// Returns true if moving from this status to `next` keeps the stage monotonic.
    pub fn can_transition_to(&self, next: StageStatus) -> bool {
        matches!(
            (self, next),
            (StageStatus::Unprocessed, StageStatus::Success)
                | (StageStatus::Unprocessed, StageStatus::Revert)
                | (StageStatus::Success, StageStatus::Revert)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Unprocessed => "UNPROCESSED",
            StageStatus::Success => "SUCCESS",
            StageStatus::Revert => "REVERT",
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Overall outcome of the order.
///
/// State transitions:
/// ```text
/// REQUESTED ──┬──► CREATED
///             └──► CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderOutcome {
    /// The saga is still running forward.
    #[default]
    Requested,

    /// Every stage succeeded (terminal state).
    Created,

    /// Some stage failed (terminal state).
    Cancelled,
}

impl OrderOutcome {
    /// Returns true if this is a terminal outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderOutcome::Created | OrderOutcome::Cancelled)
    }

    /// Returns true if the outcome may be set to `next`.
    ///
    /// Re-cancelling a cancelled order is allowed because every compensating
    /// participant republishes with `CANCELLED`.
    pub fn can_transition_to(&self, next: OrderOutcome) -> bool {
        matches!(
            (self, next),
            (OrderOutcome::Requested, OrderOutcome::Created)
                | (OrderOutcome::Requested, OrderOutcome::Cancelled)
                | (OrderOutcome::Cancelled, OrderOutcome::Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderOutcome::Requested => "REQUESTED",
            OrderOutcome::Created => "CREATED",
            OrderOutcome::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
