//! Aggregate state, aggregate roots and optimistic-concurrency expectations.

use serde::{Deserialize, Serialize};

use crate::id::AggregateId;

/// Replayable state of one aggregate instance.
///
/// The version counts **commits**, not events: a save that carries three
/// events moves the version by one. Rehydration sets the version from the
/// persisted commit revision, so `apply` must never touch it.
///
/// `apply` is the fold step used both when raising new events and when
/// replaying history. It must be pure: no IO, no clocks, no randomness.
pub trait AggregateState: Clone + core::fmt::Debug + Send + Sync + 'static {
    type Event: Clone + core::fmt::Debug + Send + Sync + 'static;

    /// Fresh state for an aggregate with no history (version 0).
    fn initial(id: AggregateId) -> Self;

    fn id(&self) -> AggregateId;

    fn version(&self) -> u64;

    fn set_version(&mut self, version: u64);

    /// Evolve state from a single event.
    fn apply(&mut self, event: &Self::Event);
}

/// Decision logic for an aggregate.
///
/// `handle` inspects the current state and returns the events describing what
/// should happen. It must not mutate state; evolution happens through
/// [`AggregateState::apply`] when the events are raised.
pub trait Behavior: AggregateState {
    type Command: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}

/// In-memory aggregate: current state plus the events raised since the last
/// commit.
#[derive(Debug, Clone)]
pub struct AggregateRoot<S: AggregateState> {
    state: S,
    uncommitted: Vec<S::Event>,
}

impl<S: AggregateState> AggregateRoot<S> {
    /// A brand-new aggregate at version 0.
    pub fn new(id: AggregateId) -> Self {
        Self::from_state(S::initial(id))
    }

    pub fn from_state(state: S) -> Self {
        Self {
            state,
            uncommitted: Vec::new(),
        }
    }

    pub fn id(&self) -> AggregateId {
        self.state.id()
    }

    pub fn version(&self) -> u64 {
        self.state.version()
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn into_state(self) -> S {
        self.state
    }

    /// Events raised since the last successful commit, in raise order.
    pub fn uncommitted_events(&self) -> &[S::Event] {
        &self.uncommitted
    }

    pub fn has_uncommitted_events(&self) -> bool {
        !self.uncommitted.is_empty()
    }

    /// Apply a new event and queue it for the next commit.
    pub fn raise(&mut self, event: S::Event) {
        self.state.apply(&event);
        self.uncommitted.push(event);
    }

    /// Fold one persisted commit into the state (rehydration).
    ///
    /// Replayed events are history, so nothing is queued.
    pub fn replay<'a>(&mut self, revision: u64, events: impl IntoIterator<Item = &'a S::Event>)
    where
        S::Event: 'a,
    {
        for event in events {
            self.state.apply(event);
        }
        self.state.set_version(revision);
    }

    /// Adopt the committed version and drain the pending events.
    pub fn mark_committed(&mut self, version: u64) -> Vec<S::Event> {
        self.state.set_version(version);
        std::mem::take(&mut self.uncommitted)
    }

    /// Decide and raise events for a command in one step.
    ///
    /// Returns how many events were raised. On error nothing is raised.
    pub fn execute(&mut self, command: &S::Command) -> Result<usize, S::Error>
    where
        S: Behavior,
    {
        let events = self.state.handle(command)?;
        let raised = events.len();
        for event in events {
            self.raise(event);
        }
        Ok(raised)
    }
}

/// Optimistic concurrency expectation carried by a command.
///
/// On the wire this is a signed revision where `-1` means "unset".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ExpectedRevision {
    /// Let the runtime reserve the next version for this command.
    #[default]
    Unset,
    /// The caller believes the aggregate will be at exactly this version
    /// once the command is committed.
    Exact(u64),
}

impl ExpectedRevision {
    pub const UNSET_RAW: i64 = -1;

    /// Any negative raw value is treated as unset.
    pub fn from_raw(raw: i64) -> Self {
        u64::try_from(raw).map_or(Self::Unset, Self::Exact)
    }

    pub fn as_raw(self) -> i64 {
        match self {
            Self::Unset => Self::UNSET_RAW,
            Self::Exact(v) => i64::try_from(v).unwrap_or(i64::MAX),
        }
    }

    pub fn is_unset(self) -> bool {
        matches!(self, Self::Unset)
    }

    pub fn exact(self) -> Option<u64> {
        match self {
            Self::Unset => None,
            Self::Exact(v) => Some(v),
        }
    }
}

impl From<i64> for ExpectedRevision {
    fn from(raw: i64) -> Self {
        Self::from_raw(raw)
    }
}

impl From<ExpectedRevision> for i64 {
    fn from(value: ExpectedRevision) -> Self {
        value.as_raw()
    }
}
