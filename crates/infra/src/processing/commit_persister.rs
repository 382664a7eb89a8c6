//! Handler that persists commits arriving over a transport pipeline.

use tracing::{debug, warn};

use evented_events::{AggregateCommit, COMMIT_CONTRACT, Codec, FeedResult, JsonCodec, PersistedCommit, TransportMessage};

use super::middleware::TransportMessageHandler;
use crate::event_store::{EventStore, EventStoreError};

/// Appends each received [`AggregateCommit`] to an [`EventStore`].
///
/// Only the commit header is decoded (events stay as raw JSON); the stored
/// body is the message body unchanged. Out-of-order or duplicate revisions are
/// per-message failures. A backend failure faults the batch.
#[derive(Debug)]
pub struct CommitPersistingHandler<St, Cd = JsonCodec> {
    store: St,
    codec: Cd,
}

impl<St: EventStore> CommitPersistingHandler<St> {
    pub fn new(store: St) -> Self {
        Self {
            store,
            codec: JsonCodec,
        }
    }
}

impl<St, Cd> CommitPersistingHandler<St, Cd> {
    pub fn with_codec<Cd2: Codec>(self, codec: Cd2) -> CommitPersistingHandler<St, Cd2> {
        CommitPersistingHandler {
            store: self.store,
            codec,
        }
    }

    pub fn store(&self) -> &St {
        &self.store
    }
}

impl<St, Cd> TransportMessageHandler for CommitPersistingHandler<St, Cd>
where
    St: EventStore,
    Cd: Codec,
{
    fn handle(&self, message: &TransportMessage) -> anyhow::Result<FeedResult> {
        if message.message_type() != COMMIT_CONTRACT {
            return Ok(FeedResult::failure(
                message.clone(),
                format!("unexpected message type {}", message.message_type()),
            ));
        }

        let body = message.message().body();
        let header: AggregateCommit<serde_json::Value> = match self.codec.decode(body) {
            Ok(header) => header,
            Err(err) => return Ok(FeedResult::failure(message.clone(), err)),
        };

        let record = PersistedCommit::new(header.aggregate_id, header.revision, body.clone());
        match self.store.append(record) {
            Ok(()) => {
                debug!(
                    aggregate_id = %header.aggregate_id,
                    revision = header.revision,
                    "commit persisted"
                );
                Ok(FeedResult::success(message.clone()))
            }
            Err(err @ (EventStoreError::Concurrency(_) | EventStoreError::InvalidAppend(_))) => {
                warn!(
                    aggregate_id = %header.aggregate_id,
                    revision = header.revision,
                    error = %err,
                    "commit refused by store"
                );
                Ok(FeedResult::failure(message.clone(), err))
            }
            Err(err @ EventStoreError::Backend(_)) => Err(err.into()),
        }
    }
}
