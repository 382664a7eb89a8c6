//! Aggregate repositories: load by replay, save through optimistic concurrency.
//!
//! ## Save pipeline
//!
//! ```text
//! AggregateRoot (pending events)
//!   ↓
//! 1. No pending events → NoOp (nothing persisted, nothing published)
//!   ↓
//! 2. Bump version, build Commit(snapshot, events, command)
//!   ↓
//! 3. Resolve expected revision (arbiter when unset)
//!   ↓
//! 4. Version check → Concurrency on mismatch
//!   ↓
//! 5. Append one PersistedCommit
//!   ↓
//! 6. Publish each event in order
//! ```
//!
//! Steps 5 and 6 are not transactional. A publication failure after the append
//! is reported as [`RepositoryError::Publish`] with the number of events that
//! did go out; nothing is rolled back or retried here.

mod commit_publishing;
mod event_sourced;

pub use commit_publishing::CommitPublishingRepository;
pub use event_sourced::EventSourcedRepository;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{error, warn};

use evented_core::{AggregateId, AggregateRoot, AggregateState, Behavior, CommitId, DomainError};
use evented_events::{AggregateCommit, Codec, CodecError, Command, PersistedCommit, Publisher};

use crate::event_store::EventStoreError;

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The resolved expected revision does not match the version the save
    /// would produce. Reload and retry the command.
    #[error(
        "concurrency conflict on aggregate {aggregate_id}: expected revision {expected}, save would produce {actual}"
    )]
    Concurrency {
        aggregate_id: AggregateId,
        expected: u64,
        actual: u64,
    },

    /// The mutation was rejected by the domain.
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("event store failure: {0}")]
    Store(#[from] EventStoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Loaded records do not form a valid history for the aggregate.
    #[error("corrupt stream for aggregate {aggregate_id}: {reason}")]
    CorruptStream {
        aggregate_id: AggregateId,
        reason: String,
    },

    /// The commit is persisted but publication stopped part-way.
    #[error(
        "commit {revision} of aggregate {aggregate_id} persisted, but only {published}/{total} message(s) published: {reason}"
    )]
    Publish {
        aggregate_id: AggregateId,
        revision: u64,
        published: usize,
        total: usize,
        reason: String,
    },

    /// The repository variant does not support this operation.
    #[error("operation not supported by this repository: {0}")]
    Unimplemented(&'static str),
}

impl RepositoryError {
    /// True for failures a command dispatcher should answer with
    /// reload-and-retry.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            RepositoryError::Concurrency { .. }
                | RepositoryError::Store(EventStoreError::Concurrency(_))
        )
    }
}

/// What a successful save did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The aggregate had no pending events.
    NoOp,
    Committed {
        commit_id: CommitId,
        revision: u64,
        events: usize,
    },
}

impl SaveOutcome {
    pub fn revision(&self) -> Option<u64> {
        match self {
            SaveOutcome::NoOp => None,
            SaveOutcome::Committed { revision, .. } => Some(*revision),
        }
    }
}

/// Result of a load-modify-save cycle.
///
/// The aggregate is handed back whatever the save outcome was; check
/// `outcome` before treating it as committed.
#[derive(Debug)]
pub struct Updated<S: AggregateState> {
    pub aggregate: AggregateRoot<S>,
    pub outcome: Result<SaveOutcome, RepositoryError>,
}

impl<S: AggregateState> Updated<S> {
    pub fn into_result(self) -> Result<(AggregateRoot<S>, SaveOutcome), RepositoryError> {
        let Updated { aggregate, outcome } = self;
        outcome.map(|o| (aggregate, o))
    }
}

/// Repository contract for one aggregate type.
pub trait AggregateRepository<S: AggregateState> {
    /// Rebuild the aggregate from its full commit history.
    ///
    /// An aggregate without history loads as its initial state (version 0).
    fn load(&self, aggregate_id: AggregateId) -> Result<AggregateRoot<S>, RepositoryError>;

    /// Persist and publish the aggregate's pending events as one commit.
    fn save<C>(&self, root: &mut AggregateRoot<S>, command: &C) -> Result<SaveOutcome, RepositoryError>
    where
        C: Command;

    /// Load, mutate, then save with a caller-supplied save routine.
    ///
    /// `Err` only when the aggregate could not be loaded.
    fn update_with<C, F, Sv>(&self, command: &C, mutate: F, save: Sv) -> Result<Updated<S>, RepositoryError>
    where
        C: Command,
        F: FnOnce(&mut AggregateRoot<S>) -> Result<(), DomainError>,
        Sv: FnOnce(&mut AggregateRoot<S>, &C) -> Result<SaveOutcome, RepositoryError>;

    /// Load, mutate, then [`save`](AggregateRepository::save).
    fn update<C, F>(&self, command: &C, mutate: F) -> Result<Updated<S>, RepositoryError>
    where
        C: Command,
        F: FnOnce(&mut AggregateRoot<S>) -> Result<(), DomainError>,
    {
        self.update_with(command, mutate, |root, cmd| self.save(root, cmd))
    }

    /// Load, run the aggregate's own decision logic for `command`, then save.
    fn execute(&self, command: &S::Command) -> Result<Updated<S>, RepositoryError>
    where
        S: Behavior<Error = DomainError>,
        S::Command: Command,
    {
        self.update(command, |root| root.execute(command).map(|_| ()))
    }
}

/// Run `attempt` again while it fails with a concurrency conflict.
///
/// `attempt` receives the 1-based attempt number and must reload the aggregate
/// itself (e.g. by calling [`AggregateRepository::update`]). Any other error,
/// or a conflict on the last attempt, is returned as-is.
pub fn retry_on_conflict<T>(
    max_attempts: usize,
    mut attempt: impl FnMut(usize) -> Result<T, RepositoryError>,
) -> Result<T, RepositoryError> {
    let mut n = 1;
    loop {
        match attempt(n) {
            Err(err) if err.is_conflict() && n < max_attempts => {
                warn!(attempt = n, max_attempts, error = %err, "concurrency conflict, retrying command");
                n += 1;
            }
            other => return other,
        }
    }
}

/// Fold persisted records into a fresh aggregate.
pub(crate) fn rehydrate<S, Cd>(
    codec: &Cd,
    aggregate_id: AggregateId,
    records: &[PersistedCommit],
) -> Result<AggregateRoot<S>, RepositoryError>
where
    S: AggregateState,
    S::Event: DeserializeOwned,
    Cd: Codec,
{
    let corrupt = |reason: String| RepositoryError::CorruptStream {
        aggregate_id,
        reason,
    };

    let mut root = AggregateRoot::<S>::new(aggregate_id);
    let mut last = 0u64;

    for (idx, record) in records.iter().enumerate() {
        if record.aggregate_id != aggregate_id {
            return Err(corrupt(format!(
                "record {idx} belongs to aggregate {}",
                record.aggregate_id
            )));
        }
        if record.revision <= last {
            return Err(corrupt(format!(
                "non-monotonic revision at record {idx} (last={last}, found={})",
                record.revision
            )));
        }

        let body: AggregateCommit<S::Event> = codec.decode(&record.body)?;
        if body.aggregate_id != aggregate_id || body.revision != record.revision {
            return Err(corrupt(format!(
                "record {idx} body does not match its header (revision {} vs {})",
                body.revision, record.revision
            )));
        }

        root.replay(record.revision, &body.events);
        last = record.revision;
    }

    Ok(root)
}

/// Publish messages in order, stopping at the first failure.
pub(crate) fn publish_all<M, P>(
    publisher: &P,
    aggregate_id: AggregateId,
    revision: u64,
    messages: &[M],
) -> Result<(), RepositoryError>
where
    P: Publisher<M>,
{
    for (published, message) in messages.iter().enumerate() {
        if let Err(err) = publisher.publish(message) {
            error!(
                aggregate_id = %aggregate_id,
                revision,
                published,
                total = messages.len(),
                error = %err,
                "commit persisted but publication failed"
            );
            return Err(RepositoryError::Publish {
                aggregate_id,
                revision,
                published,
                total: messages.len(),
                reason: err.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use evented_events::JsonCodec;

    use super::*;

    #[test]
    fn retry_stops_on_success() {
        let calls = Cell::new(0);
        let result = retry_on_conflict(5, |n| {
            calls.set(n);
            if n < 3 {
                Err(RepositoryError::Concurrency {
                    aggregate_id: AggregateId::new(),
                    expected: 2,
                    actual: 1,
                })
            } else {
                Ok(n)
            }
        });
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn retry_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), _> = retry_on_conflict(2, |n| {
            calls.set(n);
            Err(RepositoryError::Store(EventStoreError::Concurrency("taken".into())))
        });
        assert!(result.unwrap_err().is_conflict());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn retry_does_not_retry_hard_failures() {
        let calls = Cell::new(0);
        let result: Result<(), _> = retry_on_conflict(5, |n| {
            calls.set(n);
            Err(RepositoryError::Unimplemented("update"))
        });
        assert!(matches!(result, Err(RepositoryError::Unimplemented(_))));
        assert_eq!(calls.get(), 1);
    }

    #[derive(Debug, Clone)]
    struct Counter {
        id: AggregateId,
        version: u64,
        sum: u32,
    }

    impl AggregateState for Counter {
        type Event = u32;

        fn initial(id: AggregateId) -> Self {
            Self { id, version: 0, sum: 0 }
        }

        fn id(&self) -> AggregateId {
            self.id
        }

        fn version(&self) -> u64 {
            self.version
        }

        fn set_version(&mut self, version: u64) {
            self.version = version;
        }

        fn apply(&mut self, event: &u32) {
            self.sum += event;
        }
    }

    fn record(id: AggregateId, revision: u64, events: Vec<u32>) -> PersistedCommit {
        let body = AggregateCommit {
            commit_id: CommitId::new(),
            aggregate_id: id,
            revision,
            events,
            committed_at: chrono::Utc::now(),
        };
        PersistedCommit::new(id, revision, JsonCodec.encode(&body).unwrap())
    }

    #[test]
    fn rehydrate_folds_records_in_order() {
        let id = AggregateId::new();
        let records = vec![record(id, 1, vec![1, 2]), record(id, 2, vec![3])];
        let root = rehydrate::<Counter, _>(&JsonCodec, id, &records).unwrap();
        assert_eq!(root.state().sum, 6);
        assert_eq!(root.version(), 2);
    }

    #[test]
    fn rehydrate_rejects_foreign_and_unordered_records() {
        let id = AggregateId::new();

        let foreign = vec![record(AggregateId::new(), 1, vec![1])];
        assert!(matches!(
            rehydrate::<Counter, _>(&JsonCodec, id, &foreign),
            Err(RepositoryError::CorruptStream { .. })
        ));

        let unordered = vec![record(id, 2, vec![1]), record(id, 1, vec![1])];
        assert!(matches!(
            rehydrate::<Counter, _>(&JsonCodec, id, &unordered),
            Err(RepositoryError::CorruptStream { .. })
        ));
    }
}
