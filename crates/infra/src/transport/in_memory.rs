//! In-process pipeline transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use evented_events::EndpointMessage;

use super::buffer::EndpointBuffer;
use super::{DeliveryReport, Endpoint, EndpointDefinition, Pipeline, PipelineTransport, TransportError, TransportStats};
use crate::config::TransportConfig;

#[derive(Debug, Clone)]
struct Binding {
    endpoint: Endpoint,
    buffer: Arc<EndpointBuffer>,
}

#[derive(Debug)]
struct PipelineEntry {
    pipeline: Pipeline,
    bindings: RwLock<Vec<Binding>>,
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    delivered: AtomicU64,
    rejected: AtomicU64,
    consumed: AtomicU64,
}

/// [`PipelineTransport`] backed by in-process queues.
///
/// - Pipelines and endpoints live in concurrent maps; lookups and creation need
///   no external locking.
/// - Each endpoint owns one FIFO buffer. Sends never block: a full bounded
///   buffer rejects the message for that endpoint only.
/// - Counters are per instance.
#[derive(Debug)]
pub struct InMemoryPipelineTransport {
    config: TransportConfig,
    pipelines: DashMap<String, Arc<PipelineEntry>>,
    endpoints: DashMap<String, Binding>,
    counters: Counters,
}

impl InMemoryPipelineTransport {
    pub fn new() -> Self {
        Self::with_config(TransportConfig::default())
    }

    pub fn with_config(config: TransportConfig) -> Self {
        Self {
            config,
            pipelines: DashMap::new(),
            endpoints: DashMap::new(),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn pipeline_entry(&self, name: &str) -> Arc<PipelineEntry> {
        if let Some(entry) = self.pipelines.get(name) {
            return entry.clone();
        }
        self.pipelines
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(pipeline = name, "pipeline created");
                Arc::new(PipelineEntry {
                    pipeline: Pipeline::new(name),
                    bindings: RwLock::new(Vec::new()),
                })
            })
            .clone()
    }

    fn buffer_of(&self, endpoint: &Endpoint) -> Result<Arc<EndpointBuffer>, TransportError> {
        self.endpoints
            .get(endpoint.name())
            .map(|binding| binding.buffer.clone())
            .ok_or_else(|| TransportError::UnknownEndpoint(endpoint.name().to_string()))
    }
}

impl Default for InMemoryPipelineTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineTransport for InMemoryPipelineTransport {
    fn get_or_add_pipeline(&self, name: &str) -> Pipeline {
        self.pipeline_entry(name).pipeline.clone()
    }

    fn get_or_add_endpoint(&self, definition: &EndpointDefinition) -> Endpoint {
        match self.endpoints.entry(definition.endpoint_name.clone()) {
            Entry::Occupied(existing) => {
                let endpoint = existing.get().endpoint.clone();
                if endpoint.pipeline_name() != definition.pipeline_name {
                    warn!(
                        endpoint = endpoint.name(),
                        bound_to = endpoint.pipeline_name(),
                        requested = %definition.pipeline_name,
                        "endpoint already bound to another pipeline; returning existing endpoint"
                    );
                }
                endpoint
            }
            Entry::Vacant(slot) => {
                let pipeline = self.pipeline_entry(&definition.pipeline_name);
                let binding = Binding {
                    endpoint: Endpoint::new(
                        definition.endpoint_name.clone(),
                        definition.pipeline_name.clone(),
                        definition.routing_headers.clone(),
                    ),
                    buffer: Arc::new(EndpointBuffer::new(self.config.capacity)),
                };
                pipeline.bindings.write().push(binding.clone());
                debug!(
                    endpoint = %definition.endpoint_name,
                    pipeline = %definition.pipeline_name,
                    headers = definition.routing_headers.len(),
                    "endpoint created"
                );
                slot.insert(binding).endpoint.clone()
            }
        }
    }

    fn send(&self, pipeline: &Pipeline, message: EndpointMessage) -> DeliveryReport {
        self.counters.sent.fetch_add(1, Ordering::Relaxed);

        let Some(entry) = self.pipelines.get(pipeline.name()).map(|e| e.clone()) else {
            trace!(pipeline = pipeline.name(), "send to unknown pipeline");
            return DeliveryReport::default();
        };

        let mut report = DeliveryReport::default();
        for binding in entry.bindings.read().iter() {
            if !binding.endpoint.accepts(&message) {
                continue;
            }
            if binding.buffer.push(message.clone()) {
                report.delivered.push(binding.endpoint.name().to_string());
            } else {
                warn!(
                    endpoint = binding.endpoint.name(),
                    message_type = message.message_type(),
                    "endpoint buffer full; message rejected"
                );
                report.rejected.push(binding.endpoint.name().to_string());
            }
        }

        self.counters
            .delivered
            .fetch_add(report.delivered.len() as u64, Ordering::Relaxed);
        self.counters
            .rejected
            .fetch_add(report.rejected.len() as u64, Ordering::Relaxed);

        trace!(
            pipeline = pipeline.name(),
            message_type = message.message_type(),
            delivered = report.delivered.len(),
            "message sent"
        );
        report
    }

    fn block_dequeue(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<Option<EndpointMessage>, TransportError> {
        let buffer = self.buffer_of(endpoint)?;
        let message = buffer.pop_timeout(timeout);
        if message.is_some() {
            self.counters.consumed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(message)
    }

    fn dequeue_no_wait(&self, endpoint: &Endpoint) -> Result<Option<EndpointMessage>, TransportError> {
        self.block_dequeue(endpoint, self.config.no_wait_timeout())
    }

    fn stats(&self) -> TransportStats {
        TransportStats {
            messages_sent: self.counters.sent.load(Ordering::Relaxed),
            messages_delivered: self.counters.delivered.load(Ordering::Relaxed),
            messages_rejected: self.counters.rejected.load(Ordering::Relaxed),
            messages_consumed: self.counters.consumed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Instant;

    use evented_events::RoutingHeaders;

    use super::*;
    use crate::config::BufferCapacity;

    fn tenant_endpoint(transport: &InMemoryPipelineTransport, name: &str, tenant: &str) -> Endpoint {
        transport.get_or_add_endpoint(
            &EndpointDefinition::new("app.Events", name).with_routing_header("tenant", tenant),
        )
    }

    #[test]
    fn routes_by_matching_header_only() {
        let transport = InMemoryPipelineTransport::new();
        let a = tenant_endpoint(&transport, "a", "A");
        let pipeline = transport.get_or_add_pipeline("app.Events");

        let hit = EndpointMessage::new("x", b"one".to_vec())
            .with_routing_headers(RoutingHeaders::new().with("tenant", "A").with("kind", "X"));
        let miss = EndpointMessage::new("x", b"two".to_vec()).with_routing_header("tenant", "B");

        assert_eq!(transport.send(&pipeline, hit).delivered, vec!["a".to_string()]);
        assert!(transport.send(&pipeline, miss).is_unrouted());

        let received = transport.dequeue_no_wait(&a).unwrap().unwrap();
        assert_eq!(received.body().as_ref(), b"one");
        assert!(transport.dequeue_no_wait(&a).unwrap().is_none());
    }

    #[test]
    fn fans_out_to_every_match() {
        let transport = InMemoryPipelineTransport::new();
        let a = tenant_endpoint(&transport, "a", "A");
        let b = tenant_endpoint(&transport, "b", "A");
        let pipeline = transport.get_or_add_pipeline("app.Events");

        let report = transport.send(&pipeline, EndpointMessage::new("x", vec![1]).with_routing_header("tenant", "A"));

        assert_eq!(report.delivered.len(), 2);
        assert!(transport.dequeue_no_wait(&a).unwrap().is_some());
        assert!(transport.dequeue_no_wait(&b).unwrap().is_some());
    }

    #[test]
    fn endpoint_creation_is_idempotent_by_name() {
        let transport = InMemoryPipelineTransport::new();
        let first = tenant_endpoint(&transport, "shared", "A");
        let second = transport.get_or_add_endpoint(
            &EndpointDefinition::new("other.Events", "shared").with_routing_header("tenant", "Z"),
        );

        assert_eq!(first, second);
        assert_eq!(second.pipeline_name(), "app.Events");
        assert_eq!(second.routing_headers().get("tenant"), Some("A"));
        assert_eq!(transport.get_or_add_pipeline("app.Events"), transport.get_or_add_pipeline("app.Events"));
    }

    #[test]
    fn block_dequeue_times_out_empty() {
        let transport = InMemoryPipelineTransport::new();
        let a = tenant_endpoint(&transport, "a", "A");

        let started = Instant::now();
        let result = transport.block_dequeue(&a, Duration::from_millis(50)).unwrap();

        let waited = started.elapsed();
        assert!(result.is_none());
        assert!(waited >= Duration::from_millis(50));
        assert!(waited < Duration::from_millis(500), "waited {waited:?}");
    }

    #[test]
    fn unknown_endpoint_is_an_error() {
        let transport = InMemoryPipelineTransport::new();
        let foreign = InMemoryPipelineTransport::new();
        let endpoint = tenant_endpoint(&foreign, "elsewhere", "A");

        assert_eq!(
            transport.block_dequeue(&endpoint, Duration::ZERO),
            Err(TransportError::UnknownEndpoint("elsewhere".to_string()))
        );
    }

    #[test]
    fn send_to_unknown_pipeline_is_silent() {
        let transport = InMemoryPipelineTransport::new();
        let other = InMemoryPipelineTransport::new();
        let pipeline = other.get_or_add_pipeline("nowhere");

        let report = transport.send(&pipeline, EndpointMessage::new("x", vec![1]));
        assert!(report.is_unrouted());
        assert_eq!(transport.stats().messages_sent, 1);
    }

    #[test]
    fn full_bounded_endpoint_rejects_without_blocking() {
        let transport =
            InMemoryPipelineTransport::with_config(TransportConfig::default().with_capacity(BufferCapacity::Bounded(1)));
        let _a = tenant_endpoint(&transport, "a", "A");
        let pipeline = transport.get_or_add_pipeline("app.Events");
        let message = EndpointMessage::new("x", vec![1]).with_routing_header("tenant", "A");

        assert_eq!(transport.send(&pipeline, message.clone()).delivered.len(), 1);
        let report = transport.send(&pipeline, message);
        assert_eq!(report.rejected, vec!["a".to_string()]);

        let stats = transport.stats();
        assert_eq!(stats.messages_sent, 2);
        assert_eq!(stats.messages_delivered, 1);
        assert_eq!(stats.messages_rejected, 1);
    }

    #[test]
    fn counts_consumed_messages() {
        let transport = Arc::new(InMemoryPipelineTransport::new());
        let a = tenant_endpoint(&transport, "a", "A");
        let pipeline = transport.get_or_add_pipeline("app.Events");

        let producer = {
            let transport = transport.clone();
            thread::spawn(move || {
                for n in 0..10u8 {
                    transport.send(&pipeline, EndpointMessage::new("x", vec![n]).with_routing_header("tenant", "A"));
                }
            })
        };
        producer.join().unwrap();

        let mut seen = Vec::new();
        while let Some(message) = transport.dequeue_no_wait(&a).unwrap() {
            seen.push(message.body()[0]);
        }
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        assert_eq!(transport.stats().messages_consumed, 10);
    }
}
