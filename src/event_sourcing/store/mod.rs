// ============================================================================
// Event Sourcing Store - Generic Persistence Layer
// ============================================================================
//
// The `EventStore` trait with a ScyllaDB backend and an in-memory backend.
//
// ============================================================================

pub mod event_store;
pub mod memory;

pub use event_store::{EventStore, ScyllaEventStore, StoreError, load_aggregate};
pub(crate) use event_store::lwt_applied;
pub use memory::InMemoryEventStore;
