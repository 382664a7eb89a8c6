//! Background workers.

pub mod endpoint_consumer;

pub use endpoint_consumer::{ConsumerHandle, ConsumerStats, EndpointConsumer};
