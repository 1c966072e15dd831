// ============================================================================
// Order Domain - Business Logic for the Order Aggregate
// ============================================================================
//
// This module contains ALL order-specific code:
// - Value objects (VendorLot, OrderItem, DeliveryMode, statuses)
// - Events (OrderPlaced, LotAccepted, ItemCancelled, ...)
// - Commands (AcceptLot, ConfirmDepotReceipt, CancelItem, ...)
// - Errors (OrderError, ErrorKind)
// - Fee calculation and order snapshots taken from the cart
// - Aggregate (OrderAggregate with the fulfillment state machine)
// - Read model and order number reservation
// - Command Handler (OrderCommandHandler)
//
// This is completely separate from the generic event sourcing infrastructure.
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod fees;
pub mod aggregate;
pub mod snapshot;
pub mod read_model;
pub mod order_number;
pub mod command_handler;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::OrderAggregate;
pub use snapshot::{OrderSnapshotBuilder, PlaceOrderRequest, SnapshotSettings};
pub use read_model::{InMemoryOrderReadModel, OrderReadModel};
pub use command_handler::{OrderCommandHandler, OrderSettings};
