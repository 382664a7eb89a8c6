//! `evented-core`: aggregate building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{AggregateRoot, AggregateState, Behavior, ExpectedRevision};
pub use error::DomainError;
pub use id::{AggregateId, CommitId};
