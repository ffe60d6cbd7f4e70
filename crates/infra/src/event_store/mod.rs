//! Append-only event store boundary.
//!
//! Storage-agnostic abstraction over tenant-scoped event streams. Streams are
//! keyed `(tenant_id, aggregate_id)`; within a stream, sequence numbers are
//! assigned at append time and increase without gaps.

pub mod in_memory;
pub mod store;

pub use in_memory::InMemoryEventStore;
pub use store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
