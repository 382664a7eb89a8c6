//! Routed transport: named pipelines fanning messages out to header-filtered
//! endpoints with blocking, timeout-bounded consumption.
//!
//! ```text
//! send(pipeline, message)
//!   ↓
//! every endpoint bound to the pipeline
//!   ↓ routing headers match?
//! endpoint buffer (FIFO) ──block_dequeue──> consumer
//! ```
//!
//! A message nobody matches is dropped silently; the [`DeliveryReport`] of the
//! send is simply empty.

mod buffer;
pub mod conventions;
pub mod in_memory;
pub mod publisher;

use std::time::Duration;

use thiserror::Error;

use evented_events::{EndpointMessage, RoutingHeaders};

pub use conventions::{
    BoundedContext, EndpointNameConvention, EndpointPerBoundedContext, PipelineNameConvention,
};
pub use in_memory::InMemoryPipelineTransport;
pub use publisher::{PublishError, TransportPublisher};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("endpoint {0:?} is not registered with this transport")]
    UnknownEndpoint(String),
}

/// A named channel. Identity is the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pipeline {
    name: String,
}

impl Pipeline {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A named sink bound to one pipeline.
///
/// Identity is the name alone: two handles with the same name are the same
/// endpoint whatever else they carry.
#[derive(Debug, Clone)]
pub struct Endpoint {
    name: String,
    pipeline: String,
    routing_headers: RoutingHeaders,
}

impl Endpoint {
    pub(crate) fn new(name: impl Into<String>, pipeline: impl Into<String>, routing_headers: RoutingHeaders) -> Self {
        Self {
            name: name.into(),
            pipeline: pipeline.into(),
            routing_headers,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the pipeline the endpoint was bound to at creation.
    pub fn pipeline_name(&self) -> &str {
        &self.pipeline
    }

    pub fn routing_headers(&self) -> &RoutingHeaders {
        &self.routing_headers
    }

    pub fn accepts(&self, message: &EndpointMessage) -> bool {
        self.routing_headers.accepts(message.routing_headers())
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Endpoint {}

impl std::hash::Hash for Endpoint {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Everything needed to create (or look up) an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDefinition {
    pub pipeline_name: String,
    pub endpoint_name: String,
    pub routing_headers: RoutingHeaders,
}

impl EndpointDefinition {
    pub fn new(pipeline_name: impl Into<String>, endpoint_name: impl Into<String>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            endpoint_name: endpoint_name.into(),
            routing_headers: RoutingHeaders::new(),
        }
    }

    pub fn with_routing_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.routing_headers.insert(key, value);
        self
    }

    pub fn with_routing_headers(mut self, headers: RoutingHeaders) -> Self {
        self.routing_headers = headers;
        self
    }
}

/// Which endpoints a send reached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Endpoints that enqueued the message.
    pub delivered: Vec<String>,
    /// Matching endpoints whose bounded buffer was full.
    pub rejected: Vec<String>,
}

impl DeliveryReport {
    /// True when no endpoint matched at all.
    pub fn is_unrouted(&self) -> bool {
        self.delivered.is_empty() && self.rejected.is_empty()
    }
}

/// Snapshot of a transport's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub messages_sent: u64,
    pub messages_delivered: u64,
    pub messages_rejected: u64,
    pub messages_consumed: u64,
}

/// Pipeline/endpoint registry plus message routing.
///
/// Implementations are shared across producer and consumer threads; every
/// method takes `&self`.
pub trait PipelineTransport: Send + Sync {
    /// Look up a pipeline by name, creating it on first use.
    fn get_or_add_pipeline(&self, name: &str) -> Pipeline;

    /// Look up an endpoint by name, creating and binding it on first use.
    ///
    /// Endpoint names are global: an existing endpoint is returned unchanged
    /// even when `definition` names a different pipeline or headers.
    fn get_or_add_endpoint(&self, definition: &EndpointDefinition) -> Endpoint;

    /// Fan the message out to every matching endpoint of the pipeline.
    fn send(&self, pipeline: &Pipeline, message: EndpointMessage) -> DeliveryReport;

    /// Wait up to `timeout` for the next message of the endpoint.
    ///
    /// `Ok(None)` means the timeout elapsed with nothing queued.
    fn block_dequeue(&self, endpoint: &Endpoint, timeout: Duration)
    -> Result<Option<EndpointMessage>, TransportError>;

    /// `block_dequeue` with the transport's short no-wait timeout.
    fn dequeue_no_wait(&self, endpoint: &Endpoint) -> Result<Option<EndpointMessage>, TransportError>;

    fn stats(&self) -> TransportStats;
}

impl<T: PipelineTransport + ?Sized> PipelineTransport for std::sync::Arc<T> {
    fn get_or_add_pipeline(&self, name: &str) -> Pipeline {
        (**self).get_or_add_pipeline(name)
    }

    fn get_or_add_endpoint(&self, definition: &EndpointDefinition) -> Endpoint {
        (**self).get_or_add_endpoint(definition)
    }

    fn send(&self, pipeline: &Pipeline, message: EndpointMessage) -> DeliveryReport {
        (**self).send(pipeline, message)
    }

    fn block_dequeue(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<Option<EndpointMessage>, TransportError> {
        (**self).block_dequeue(endpoint, timeout)
    }

    fn dequeue_no_wait(&self, endpoint: &Endpoint) -> Result<Option<EndpointMessage>, TransportError> {
        (**self).dequeue_no_wait(endpoint)
    }

    fn stats(&self) -> TransportStats {
        (**self).stats()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn endpoints_compare_by_name_only() {
        let a = Endpoint::new("billing", "app.Events", RoutingHeaders::new().with("tenant", "A"));
        let b = Endpoint::new("billing", "other.Events", RoutingHeaders::new());
        let c = Endpoint::new("shipping", "app.Events", RoutingHeaders::new().with("tenant", "A"));

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<Endpoint> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn pipelines_compare_by_name() {
        assert_eq!(Pipeline::new("app.Events"), Pipeline::new("app.Events"));
        assert_ne!(Pipeline::new("app.Events"), Pipeline::new("app.Commands"));
    }
}
