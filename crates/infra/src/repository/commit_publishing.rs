//! Repository that hands whole commits to a message pipeline instead of
//! appending them itself.
//!
//! A downstream consumer (see
//! [`CommitPersistingHandler`](crate::processing::CommitPersistingHandler))
//! is expected to persist what this repository publishes. Loading still reads
//! the store directly.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use evented_core::{AggregateId, AggregateRoot, AggregateState, DomainError, ExpectedRevision};
use evented_events::{AggregateCommit, Codec, Command, Commit, JsonCodec, Publisher};

use super::{AggregateRepository, RepositoryError, SaveOutcome, Updated, publish_all, rehydrate};
use crate::event_store::EventStore;

/// Publishes one [`AggregateCommit`] per save.
///
/// - No version arbiter: ordering is enforced by the store when the commit is
///   persisted downstream. An explicit expected revision is still checked.
/// - `update` / `update_with` are not supported and return
///   [`RepositoryError::Unimplemented`].
#[derive(Debug)]
pub struct CommitPublishingRepository<St, P, Cd = JsonCodec> {
    store: St,
    publisher: P,
    codec: Cd,
}

impl<St, P> CommitPublishingRepository<St, P> {
    pub fn new(store: St, publisher: P) -> Self {
        Self {
            store,
            publisher,
            codec: JsonCodec,
        }
    }
}

impl<St, P, Cd> CommitPublishingRepository<St, P, Cd> {
    pub fn with_codec<Cd2: Codec>(self, codec: Cd2) -> CommitPublishingRepository<St, P, Cd2> {
        CommitPublishingRepository {
            store: self.store,
            publisher: self.publisher,
            codec,
        }
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }
}

impl<S, St, P, Cd> AggregateRepository<S> for CommitPublishingRepository<St, P, Cd>
where
    S: AggregateState,
    S::Event: Serialize + DeserializeOwned,
    St: EventStore,
    P: Publisher<AggregateCommit<S::Event>>,
    Cd: Codec,
{
    fn load(&self, aggregate_id: AggregateId) -> Result<AggregateRoot<S>, RepositoryError> {
        let records = self.store.load_all(aggregate_id)?;
        rehydrate(&self.codec, aggregate_id, &records)
    }

    fn save<C>(&self, root: &mut AggregateRoot<S>, command: &C) -> Result<SaveOutcome, RepositoryError>
    where
        C: Command,
    {
        if !root.has_uncommitted_events() {
            debug!(aggregate_id = %root.id(), "nothing to publish");
            return Ok(SaveOutcome::NoOp);
        }

        let aggregate_id = root.id();
        let version = root.version() + 1;

        if let ExpectedRevision::Exact(expected) = command.expected_revision() {
            if expected != version {
                warn!(aggregate_id = %aggregate_id, expected, actual = version, "concurrency conflict on publish");
                return Err(RepositoryError::Concurrency {
                    aggregate_id,
                    expected,
                    actual: version,
                });
            }
        }

        let mut snapshot = root.state().clone();
        snapshot.set_version(version);
        let commit = Commit::new(snapshot, root.uncommitted_events().to_vec(), command.clone());
        let body = commit.to_body();

        publish_all(&self.publisher, aggregate_id, version, std::slice::from_ref(&body))?;
        let events = root.mark_committed(version);

        info!(
            aggregate_id = %aggregate_id,
            revision = version,
            events = events.len(),
            "commit published"
        );

        Ok(SaveOutcome::Committed {
            commit_id: commit.commit_id(),
            revision: version,
            events: events.len(),
        })
    }

    fn update_with<C, F, Sv>(&self, _command: &C, _mutate: F, _save: Sv) -> Result<Updated<S>, RepositoryError>
    where
        C: Command,
        F: FnOnce(&mut AggregateRoot<S>) -> Result<(), DomainError>,
        Sv: FnOnce(&mut AggregateRoot<S>, &C) -> Result<SaveOutcome, RepositoryError>,
    {
        Err(RepositoryError::Unimplemented("update"))
    }
}
