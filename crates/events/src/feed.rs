//! Consumed messages and the outcome of processing them.

use uuid::Uuid;

use crate::EndpointMessage;

/// A message taken off an endpoint, ready for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    id: Uuid,
    endpoint: String,
    message: EndpointMessage,
}

impl TransportMessage {
    pub fn new(endpoint: impl Into<String>, message: EndpointMessage) -> Self {
        Self {
            id: Uuid::now_v7(),
            endpoint: endpoint.into(),
            message,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name of the endpoint the message was dequeued from.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn message(&self) -> &EndpointMessage {
        &self.message
    }

    pub fn message_type(&self) -> &str {
        self.message.message_type()
    }

    pub fn into_message(self) -> EndpointMessage {
        self.message
    }
}

/// A message whose handler chain reported a failure it could describe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedMessage {
    pub message: TransportMessage,
    pub error: String,
}

/// An unhandled fault that stopped a batch.
///
/// `unprocessed` holds the message that faulted and every message after it;
/// none of them produced an outcome. `batch_size` is the size of the batch the
/// fault interrupted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFault {
    pub error: String,
    pub unprocessed: Vec<TransportMessage>,
    pub batch_size: usize,
}

/// Aggregated outcome of feeding messages through a handler chain.
///
/// `with` concatenates outcomes, so merging is associative and
/// [`FeedResult::empty`] is its identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedResult {
    successful: Vec<TransportMessage>,
    failed: Vec<FailedMessage>,
    batch_faults: Vec<BatchFault>,
}

impl FeedResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn success(message: TransportMessage) -> Self {
        Self {
            successful: vec![message],
            ..Self::default()
        }
    }

    pub fn failure(message: TransportMessage, error: impl core::fmt::Display) -> Self {
        Self {
            failed: vec![FailedMessage {
                message,
                error: error.to_string(),
            }],
            ..Self::default()
        }
    }

    /// Merge two results, keeping every recorded outcome.
    pub fn with(mut self, other: FeedResult) -> Self {
        self.successful.extend(other.successful);
        self.failed.extend(other.failed);
        self.batch_faults.extend(other.batch_faults);
        self
    }

    pub fn with_batch_fault(
        mut self,
        error: impl core::fmt::Display,
        unprocessed: Vec<TransportMessage>,
        batch_size: usize,
    ) -> Self {
        self.batch_faults.push(BatchFault {
            error: error.to_string(),
            unprocessed,
            batch_size,
        });
        self
    }

    pub fn successful(&self) -> &[TransportMessage] {
        &self.successful
    }

    pub fn failed(&self) -> &[FailedMessage] {
        &self.failed
    }

    pub fn batch_faults(&self) -> &[BatchFault] {
        &self.batch_faults
    }

    /// No failures and no faults.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.batch_faults.is_empty()
    }

    pub fn has_faults(&self) -> bool {
        !self.batch_faults.is_empty()
    }
}
