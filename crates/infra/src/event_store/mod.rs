//! Append-only commit log boundary.
//!
//! This module defines the persistence collaborator of the repository without
//! making any storage assumptions, plus an in-memory implementation.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError};
