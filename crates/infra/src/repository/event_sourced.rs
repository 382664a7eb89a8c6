//! Event-sourced repository: one commit record per save, then per-event publication.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use evented_core::{AggregateId, AggregateRoot, AggregateState, DomainError, ExpectedRevision};
use evented_events::{Codec, Command, Commit, JsonCodec, PersistedCommit, Publisher};

use super::{AggregateRepository, RepositoryError, SaveOutcome, Updated, publish_all, rehydrate};
use crate::event_store::EventStore;
use crate::version_service::VersionArbiter;

/// Repository that appends commits to an [`EventStore`] and publishes every
/// committed event through a [`Publisher`].
///
/// ## Concurrency
///
/// A save only goes through when the version it would produce equals the
/// command's expected revision. Commands that leave the revision unset get one
/// reserved from the shared [`VersionArbiter`]: among concurrent saves proposing
/// the same version exactly one wins, the others fail with
/// [`RepositoryError::Concurrency`] and may reload and retry.
///
/// All repositories writing the same aggregates must share one arbiter.
///
/// ## Generic Parameters
///
/// - `St`: event store
/// - `P`: publisher for the aggregate's event type
/// - `Cd`: codec for commit bodies (JSON by default)
#[derive(Debug)]
pub struct EventSourcedRepository<St, P, Cd = JsonCodec> {
    store: St,
    publisher: P,
    arbiter: Arc<VersionArbiter>,
    codec: Cd,
}

impl<St, P> EventSourcedRepository<St, P> {
    pub fn new(store: St, publisher: P, arbiter: Arc<VersionArbiter>) -> Self {
        Self {
            store,
            publisher,
            arbiter,
            codec: JsonCodec,
        }
    }
}

impl<St, P, Cd> EventSourcedRepository<St, P, Cd> {
    pub fn with_codec<Cd2: Codec>(self, codec: Cd2) -> EventSourcedRepository<St, P, Cd2> {
        EventSourcedRepository {
            store: self.store,
            publisher: self.publisher,
            arbiter: self.arbiter,
            codec,
        }
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn arbiter(&self) -> &Arc<VersionArbiter> {
        &self.arbiter
    }

    pub fn into_parts(self) -> (St, P) {
        (self.store, self.publisher)
    }
}

impl<S, St, P, Cd> AggregateRepository<S> for EventSourcedRepository<St, P, Cd>
where
    S: AggregateState,
    S::Event: Serialize + DeserializeOwned,
    St: EventStore,
    P: Publisher<S::Event>,
    Cd: Codec,
{
    fn load(&self, aggregate_id: AggregateId) -> Result<AggregateRoot<S>, RepositoryError> {
        let records = self.store.load_all(aggregate_id)?;
        let root = rehydrate(&self.codec, aggregate_id, &records)?;
        debug!(
            aggregate_id = %aggregate_id,
            commits = records.len(),
            version = root.version(),
            "aggregate loaded"
        );
        Ok(root)
    }

    /// Persist pending events as one commit and publish them in raise order.
    ///
    /// On success the aggregate adopts the new version and its pending events
    /// are cleared. On a conflict the aggregate is left untouched. The command
    /// is never modified.
    fn save<C>(&self, root: &mut AggregateRoot<S>, command: &C) -> Result<SaveOutcome, RepositoryError>
    where
        C: Command,
    {
        if !root.has_uncommitted_events() {
            debug!(aggregate_id = %root.id(), "nothing to save");
            return Ok(SaveOutcome::NoOp);
        }

        let aggregate_id = root.id();
        if command.target_aggregate_id() != aggregate_id {
            return Err(DomainError::invariant(format!(
                "command targets aggregate {} but saving {aggregate_id}",
                command.target_aggregate_id()
            ))
            .into());
        }

        let version = root.version() + 1;
        let mut snapshot = root.state().clone();
        snapshot.set_version(version);
        let commit = Commit::new(snapshot, root.uncommitted_events().to_vec(), command.clone());
        let body = self.codec.encode(&commit.to_body())?;

        let arbitrated = command.expected_revision() == ExpectedRevision::Unset;
        let expected = match command.expected_revision() {
            ExpectedRevision::Unset => self.arbiter.reserve(aggregate_id, version),
            ExpectedRevision::Exact(revision) => revision,
        };

        if version != expected {
            warn!(
                aggregate_id = %aggregate_id,
                expected,
                actual = version,
                "concurrency conflict on save"
            );
            return Err(RepositoryError::Concurrency {
                aggregate_id,
                expected,
                actual: version,
            });
        }

        if let Err(err) = self
            .store
            .append(PersistedCommit::new(aggregate_id, version, body))
        {
            if arbitrated {
                self.arbiter.release(aggregate_id, version);
            }
            warn!(aggregate_id = %aggregate_id, revision = version, error = %err, "append failed");
            return Err(err.into());
        }

        let events = root.mark_committed(version);
        publish_all(&self.publisher, aggregate_id, version, &events)?;

        info!(
            aggregate_id = %aggregate_id,
            revision = version,
            events = events.len(),
            commit_id = %commit.commit_id(),
            "commit saved"
        );

        Ok(SaveOutcome::Committed {
            commit_id: commit.commit_id(),
            revision: version,
            events: events.len(),
        })
    }

    fn update_with<C, F, Sv>(&self, command: &C, mutate: F, save: Sv) -> Result<Updated<S>, RepositoryError>
    where
        C: Command,
        F: FnOnce(&mut AggregateRoot<S>) -> Result<(), DomainError>,
        Sv: FnOnce(&mut AggregateRoot<S>, &C) -> Result<SaveOutcome, RepositoryError>,
    {
        let mut aggregate = self.load(command.target_aggregate_id())?;

        let outcome = match mutate(&mut aggregate) {
            Ok(()) => save(&mut aggregate, command),
            Err(err) => Err(err.into()),
        };

        Ok(Updated { aggregate, outcome })
    }
}
