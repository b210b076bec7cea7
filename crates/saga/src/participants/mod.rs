//! The three stage participants of the order fulfillment saga.

pub mod balance;
mod handled;
pub mod inventory;
pub mod shipment;

pub use balance::BalanceParticipant;
pub use inventory::InventoryParticipant;
pub use shipment::ShipmentParticipant;
