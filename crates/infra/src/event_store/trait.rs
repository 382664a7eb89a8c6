use std::sync::Arc;

use thiserror::Error;

use evented_core::AggregateId;
use evented_events::PersistedCommit;

/// Event store operation error.
///
/// These are **infrastructure errors** (storage, ordering) as opposed to
/// domain errors (validation, invariants).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    /// The record's revision does not follow the stream's last revision.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Append-only commit log keyed by aggregate id.
///
/// The store is the **persistence collaborator** of the repository. It keeps
/// one ordered stream of [`PersistedCommit`] records per aggregate and never
/// interprets the record bodies.
///
/// ## Append Semantics
///
/// `append()` writes exactly one record atomically. Records for one aggregate
/// are returned by `load_all()` in append order. Stores may (and the in-memory
/// one does) reject a record whose revision is not `last + 1`.
///
/// ## Load Semantics
///
/// `load_all()` returns an empty vector for an aggregate with no history.
pub trait EventStore: Send + Sync {
    fn append(&self, commit: PersistedCommit) -> Result<(), EventStoreError>;

    fn load_all(&self, aggregate_id: AggregateId) -> Result<Vec<PersistedCommit>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(&self, commit: PersistedCommit) -> Result<(), EventStoreError> {
        (**self).append(commit)
    }

    fn load_all(&self, aggregate_id: AggregateId) -> Result<Vec<PersistedCommit>, EventStoreError> {
        (**self).load_all(aggregate_id)
    }
}
