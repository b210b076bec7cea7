//! Choreographed saga for order fulfillment.
//!
//! There is no coordinator. Every participant subscribes to the same topic
//! under its own consumer group, decides from the event's status vector
//! whether the event is its turn, performs one local transaction and
//! republishes the event:
//!
//! 1. Balance: debit the user
//! 2. Inventory: reserve stock
//! 3. Shipment: hand the order to the carrier
//!
//! A failing stage cancels the order. The stage before it sees the revert on
//! its next delivery and compensates, so compensation walks back up the chain
//! one republication at a time.

pub mod error;
pub mod gateway;
pub mod order_fulfillment;
pub mod participant;
pub mod participants;
pub mod retry;
pub mod runtime;
pub mod services;

pub use error::SagaError;
pub use gateway::{IntakeGateway, OrderResponse, ResultCollector, WaitPolicy};
pub use participant::{FatalSink, Participant, ParticipantRunner};
pub use participants::{BalanceParticipant, InventoryParticipant, ShipmentParticipant};
pub use retry::{RetryPolicy, compensate_with_retry};
pub use runtime::{SagaRuntime, SagaServices, SagaSettings};
pub use services::{
    Account, BalanceLedger, Carrier, Catalog, FlakyCarrier, InMemoryBalanceLedger,
    InMemoryCarrier, InMemoryWarehouse, PostgresLedger, Product, ShipmentReceipt, StockLedger,
};
