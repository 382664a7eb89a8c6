//! Commit model: one successful state transition and its persisted forms.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use evented_core::{AggregateId, AggregateState, CommitId};

use crate::Contract;

/// Contract name under which whole commits travel through a transport.
pub const COMMIT_CONTRACT: &str = "evented.aggregate_commit";

/// The unit of persistence for one save.
///
/// Holds the state snapshot *after* the version bump, the events raised by the
/// command (in raise order) and the command itself. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct Commit<S: AggregateState, C> {
    commit_id: CommitId,
    state: S,
    events: Vec<S::Event>,
    command: C,
}

impl<S: AggregateState, C> Commit<S, C> {
    pub fn new(state: S, events: Vec<S::Event>, command: C) -> Self {
        Self {
            commit_id: CommitId::new(),
            state,
            events,
            command,
        }
    }

    pub fn commit_id(&self) -> CommitId {
        self.commit_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.state.id()
    }

    /// The aggregate version this commit produces.
    pub fn revision(&self) -> u64 {
        self.state.version()
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn events(&self) -> &[S::Event] {
        &self.events
    }

    pub fn command(&self) -> &C {
        &self.command
    }

    /// Codec-facing body of this commit.
    pub fn to_body(&self) -> AggregateCommit<S::Event> {
        AggregateCommit {
            commit_id: self.commit_id,
            aggregate_id: self.aggregate_id(),
            revision: self.revision(),
            events: self.events.clone(),
            committed_at: Utc::now(),
        }
    }
}

/// Serializable body of a commit.
///
/// `committed_at` is metadata for operators; replay never reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateCommit<E> {
    pub commit_id: CommitId,
    pub aggregate_id: AggregateId,
    pub revision: u64,
    pub events: Vec<E>,
    pub committed_at: DateTime<Utc>,
}

impl<E> Contract for AggregateCommit<E> {
    fn contract_name(&self) -> &'static str {
        COMMIT_CONTRACT
    }
}

/// A commit record as stored in the event log.
///
/// `body` is the codec output for an [`AggregateCommit`]; the store never looks
/// inside it. `aggregate_id` and `revision` are duplicated outside the body so
/// stores can key and order records without a codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCommit {
    pub aggregate_id: AggregateId,
    pub revision: u64,
    pub body: Bytes,
}

impl PersistedCommit {
    pub fn new(aggregate_id: AggregateId, revision: u64, body: impl Into<Bytes>) -> Self {
        Self {
            aggregate_id,
            revision,
            body: body.into(),
        }
    }
}
