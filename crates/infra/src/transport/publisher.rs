//! [`Publisher`] that encodes messages and sends them through a pipeline.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use evented_events::{Codec, CodecError, Contract, EndpointMessage, JsonCodec, Publisher};

use super::{BoundedContext, Pipeline, PipelineNameConvention, PipelineTransport};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// At least one matching endpoint refused the message.
    #[error("message {message_type} rejected by endpoint(s) {endpoints:?}")]
    Transport {
        message_type: String,
        endpoints: Vec<String>,
    },
}

/// Publishes contracts on a convention-named pipeline.
///
/// Each message is stamped with its contract name as `message_type` and the
/// routing header `{contract_name: product_namespace}`, which is what
/// [`EndpointPerBoundedContext`](super::EndpointPerBoundedContext) endpoints
/// filter on. A send nobody matches is not an error.
#[derive(Debug)]
pub struct TransportPublisher<T, Cd = JsonCodec> {
    transport: T,
    pipeline: Pipeline,
    product_namespace: String,
    codec: Cd,
}

impl<T: PipelineTransport> TransportPublisher<T> {
    pub fn new(transport: T, context: &BoundedContext, convention: PipelineNameConvention) -> Self {
        let pipeline = transport.get_or_add_pipeline(&convention.pipeline_name(context));
        Self {
            transport,
            pipeline,
            product_namespace: context.product_namespace.clone(),
            codec: JsonCodec,
        }
    }
}

impl<T, Cd> TransportPublisher<T, Cd> {
    pub fn with_codec<Cd2: Codec>(self, codec: Cd2) -> TransportPublisher<T, Cd2> {
        TransportPublisher {
            transport: self.transport,
            pipeline: self.pipeline,
            product_namespace: self.product_namespace,
            codec,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<M, T, Cd> Publisher<M> for TransportPublisher<T, Cd>
where
    M: Contract + Serialize,
    T: PipelineTransport,
    Cd: Codec,
{
    type Error = PublishError;

    fn publish(&self, message: &M) -> Result<(), Self::Error> {
        let contract = message.contract_name();
        let body = self.codec.encode(message)?;
        let envelope = EndpointMessage::new(contract, body).with_routing_header(contract, self.product_namespace.as_str());

        let report = self.transport.send(&self.pipeline, envelope);
        if !report.rejected.is_empty() {
            return Err(PublishError::Transport {
                message_type: contract.to_string(),
                endpoints: report.rejected,
            });
        }

        debug!(
            pipeline = self.pipeline.name(),
            message_type = contract,
            delivered = report.delivered.len(),
            "message published"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use evented_accounts::{AccountCommand, AccountEvent, AccountState};
    use evented_core::{AggregateId, AggregateRoot};

    use super::*;
    use crate::config::{BufferCapacity, TransportConfig};
    use crate::transport::{EndpointDefinition, EndpointNameConvention, EndpointPerBoundedContext, InMemoryPipelineTransport};

    fn registered_event() -> AccountEvent {
        let id = AggregateId::new();
        let mut root: AggregateRoot<AccountState> = AggregateRoot::new(id);
        root.execute(&AccountCommand::register(id, "a@example.com")).unwrap();
        root.uncommitted_events()[0].clone()
    }

    #[test]
    fn published_contract_reaches_convention_endpoint() {
        let transport = Arc::new(InMemoryPipelineTransport::new());
        let context = BoundedContext::new("shop", "accounts");
        let convention = EndpointPerBoundedContext::new(PipelineNameConvention::EventPipelinePerApplication, "Handlers");
        let endpoint = transport.get_or_add_endpoint(&convention.endpoint_definition(&context, &[AccountEvent::REGISTERED]));

        let publisher = TransportPublisher::new(transport.clone(), &context, PipelineNameConvention::EventPipelinePerApplication);
        let event = registered_event();
        publisher.publish(&event).unwrap();

        let received = transport.dequeue_no_wait(&endpoint).unwrap().unwrap();
        assert_eq!(received.message_type(), AccountEvent::REGISTERED);
        assert_eq!(received.routing_headers().get(AccountEvent::REGISTERED), Some("shop"));
        let decoded: AccountEvent = JsonCodec.decode(received.body()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn rejection_by_full_endpoint_is_a_publish_error() {
        let transport = Arc::new(InMemoryPipelineTransport::with_config(
            TransportConfig::default().with_capacity(BufferCapacity::Bounded(1)),
        ));
        transport.get_or_add_endpoint(
            &EndpointDefinition::new("shop.Events", "shop.accounts.Handlers")
                .with_routing_header(AccountEvent::REGISTERED, "shop"),
        );
        let context = BoundedContext::new("shop", "accounts");
        let publisher = TransportPublisher::new(transport, &context, PipelineNameConvention::EventPipelinePerApplication);

        let event = registered_event();
        publisher.publish(&event).unwrap();
        let err = publisher.publish(&event).unwrap_err();
        assert!(matches!(err, PublishError::Transport { ref endpoints, .. } if endpoints.len() == 1));
    }

    #[test]
    fn unrouted_publication_is_not_an_error() {
        let transport = InMemoryPipelineTransport::new();
        let publisher = TransportPublisher::new(
            transport,
            &BoundedContext::new("shop", "accounts"),
            PipelineNameConvention::EventPipelinePerApplication,
        );
        publisher.publish(&registered_event()).unwrap();
        assert_eq!(publisher.transport().stats().messages_delivered, 0);
    }
}
