//! Infrastructure layer: event store, repositories, transport and message
//! processing.

pub mod config;
pub mod event_store;
pub mod processing;
pub mod repository;
pub mod transport;
pub mod version_service;
pub mod workers;


pub use config::{BufferCapacity, ConsumerConfig, TransportConfig};
pub use repository::{AggregateRepository, RepositoryError, SaveOutcome, Updated};
pub use version_service::VersionArbiter;
