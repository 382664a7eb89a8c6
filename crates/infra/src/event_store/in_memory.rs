use std::collections::HashMap;
use std::sync::RwLock;

use evented_core::AggregateId;
use evented_events::PersistedCommit;

use super::r#trait::{EventStore, EventStoreError};

/// In-memory append-only commit log.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<AggregateId, Vec<PersistedCommit>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commits stored for an aggregate.
    pub fn commit_count(&self, aggregate_id: AggregateId) -> usize {
        self.streams
            .read()
            .map(|s| s.get(&aggregate_id).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn current_revision(stream: &[PersistedCommit]) -> u64 {
        stream.last().map(|c| c.revision).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(&self, commit: PersistedCommit) -> Result<(), EventStoreError> {
        if commit.revision == 0 {
            return Err(EventStoreError::InvalidAppend(format!(
                "commit for {} has revision 0",
                commit.aggregate_id
            )));
        }

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        let stream = streams.entry(commit.aggregate_id).or_default();
        let current = Self::current_revision(stream);

        if commit.revision != current + 1 {
            return Err(EventStoreError::Concurrency(format!(
                "aggregate {} is at revision {current}, refused revision {}",
                commit.aggregate_id, commit.revision
            )));
        }

        stream.push(commit);
        Ok(())
    }

    fn load_all(&self, aggregate_id: AggregateId) -> Result<Vec<PersistedCommit>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }
}
