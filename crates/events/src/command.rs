use evented_core::{AggregateId, ExpectedRevision};

/// A command targets a specific aggregate.
///
/// Commands represent **intent** and are transient: they are never replayed.
/// A successful save records the causing command alongside its events in the
/// in-memory [`Commit`](crate::Commit), so commands must be cheap to clone.
///
/// ## Optimistic concurrency
///
/// `expected_revision()` is the version the caller expects the aggregate to
/// reach once this command commits. Leave it [`ExpectedRevision::Unset`] to let
/// the runtime reserve the next version; pass `Exact(v)` when the caller read
/// the aggregate and knows which version it is building on.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;

    fn expected_revision(&self) -> ExpectedRevision {
        ExpectedRevision::Unset
    }
}
