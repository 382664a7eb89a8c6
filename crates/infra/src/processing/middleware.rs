//! Batch driver: feeds messages through a handler chain and folds the
//! outcomes into one [`FeedResult`].
//!
//! ## Failure model
//!
//! - A handler that can describe its failure returns it inside the
//!   `FeedResult` (per-message failure); the batch continues.
//! - A handler that returns `Err` or panics faults the batch: processing stops,
//!   a [`BatchFault`](evented_events::BatchFault) records the faulting message
//!   and everything after it, and the results gathered so far are kept.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, warn};

use evented_events::{FeedResult, TransportMessage};

use super::scope::{HandlerScope, ScopeGuard};

/// One step of message handling.
pub trait TransportMessageHandler: Send + Sync {
    fn handle(&self, message: &TransportMessage) -> anyhow::Result<FeedResult>;
}

impl<F> TransportMessageHandler for F
where
    F: Fn(&TransportMessage) -> anyhow::Result<FeedResult> + Send + Sync,
{
    fn handle(&self, message: &TransportMessage) -> anyhow::Result<FeedResult> {
        self(message)
    }
}

/// Runs batches through a handler chain, optionally inside a unit of work.
#[derive(Clone)]
pub struct MessageProcessor {
    name: String,
    chain: Arc<dyn TransportMessageHandler>,
    scope: Option<Arc<dyn HandlerScope>>,
}

impl MessageProcessor {
    pub fn new(name: impl Into<String>, chain: impl TransportMessageHandler + 'static) -> Self {
        Self {
            name: name.into(),
            chain: Arc::new(chain),
            scope: None,
        }
    }

    /// Open one unit of work per batch: committed when the batch ran without a
    /// fault, aborted otherwise.
    pub fn with_scope(mut self, scope: impl HandlerScope + 'static) -> Self {
        self.scope = Some(Arc::new(scope));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn process(&self, batch: Vec<TransportMessage>) -> FeedResult {
        if batch.is_empty() {
            return FeedResult::empty();
        }

        let Some(scope) = &self.scope else {
            return self.feed(batch);
        };

        let batch_size = batch.len();
        let guard = match scope.begin() {
            Ok(unit) => ScopeGuard::new(unit),
            Err(err) => {
                error!(processor = %self.name, error = %format!("{err:#}"), "failed to open unit of work");
                return FeedResult::empty().with_batch_fault(format!("unit of work: {err:#}"), batch, batch_size);
            }
        };

        let result = self.feed(batch);
        if result.has_faults() {
            drop(guard);
            return result;
        }

        match guard.commit() {
            Ok(()) => result,
            Err(err) => {
                error!(processor = %self.name, error = %format!("{err:#}"), "unit of work commit failed");
                result.with_batch_fault(format!("unit of work commit: {err:#}"), Vec::new(), batch_size)
            }
        }
    }

    fn feed(&self, batch: Vec<TransportMessage>) -> FeedResult {
        let batch_size = batch.len();
        let mut result = FeedResult::empty();
        let mut messages = batch.into_iter();

        while let Some(message) = messages.next() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.chain.handle(&message)));
            let error = match outcome {
                Ok(Ok(feed)) => {
                    result = result.with(feed);
                    continue;
                }
                Ok(Err(err)) => format!("{err:#}"),
                Err(payload) => format!("handler panicked: {}", panic_message(payload.as_ref())),
            };

            warn!(
                processor = %self.name,
                message_id = %message.id(),
                message_type = message.message_type(),
                batch_size,
                error = %error,
                "batch faulted"
            );

            let mut unprocessed = vec![message];
            unprocessed.extend(messages);
            return result.with_batch_fault(error, unprocessed, batch_size);
        }

        debug!(
            processor = %self.name,
            batch_size,
            successful = result.successful().len(),
            failed = result.failed().len(),
            "batch processed"
        );
        result
    }
}

impl std::fmt::Debug for MessageProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageProcessor")
            .field("name", &self.name)
            .field("scoped", &self.scope.is_some())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use evented_events::EndpointMessage;

    use super::*;
    use crate::processing::scope::testing::CountingScope;

    fn message(tag: u8) -> TransportMessage {
        TransportMessage::new("ep", EndpointMessage::new("test.msg", vec![tag]))
    }

    fn tag(message: &TransportMessage) -> u8 {
        message.message().body()[0]
    }

    fn succeed_all(message: &TransportMessage) -> anyhow::Result<FeedResult> {
        Ok(FeedResult::success(message.clone()))
    }

    #[test]
    fn clean_batch_collects_every_success() {
        let processor = MessageProcessor::new("test", succeed_all);
        let result = processor.process((0..4).map(message).collect());

        assert_eq!(result.successful().len(), 4);
        assert!(result.is_clean());
    }

    #[test]
    fn described_failures_do_not_stop_the_batch() {
        let processor = MessageProcessor::new("test", |m: &TransportMessage| -> anyhow::Result<FeedResult> {
            if tag(m) == 1 {
                Ok(FeedResult::failure(m.clone(), "rejected"))
            } else {
                Ok(FeedResult::success(m.clone()))
            }
        });

        let result = processor.process((0..3).map(message).collect());

        assert_eq!(result.successful().len(), 2);
        assert_eq!(result.failed().len(), 1);
        assert!(!result.has_faults());
    }

    #[test]
    fn error_faults_batch_and_keeps_earlier_results() {
        let processor = MessageProcessor::new("test", |m: &TransportMessage| -> anyhow::Result<FeedResult> {
            if tag(m) == 1 {
                anyhow::bail!("store unavailable")
            }
            Ok(FeedResult::success(m.clone()))
        });

        let batch: Vec<_> = (0..3).map(message).collect();
        let result = processor.process(batch.clone());

        assert_eq!(result.successful(), &batch[..1]);
        assert_eq!(result.batch_faults().len(), 1);
        let fault = &result.batch_faults()[0];
        assert_eq!(fault.unprocessed, batch[1..].to_vec());
        assert_eq!(fault.batch_size, 3);
        assert!(fault.error.contains("store unavailable"));
    }

    #[test]
    fn panic_faults_batch() {
        let processor = MessageProcessor::new("test", |m: &TransportMessage| -> anyhow::Result<FeedResult> {
            if tag(m) == 0 {
                panic!("handler exploded");
            }
            Ok(FeedResult::success(m.clone()))
        });

        let result = processor.process((0..2).map(message).collect());

        assert!(result.successful().is_empty());
        let fault = &result.batch_faults()[0];
        assert_eq!(fault.unprocessed.len(), 2);
        assert!(fault.error.contains("handler exploded"));
    }

    #[test]
    fn scope_commits_clean_batches_and_aborts_faulted_ones() {
        let scope = CountingScope::default();
        let processor = MessageProcessor::new("test", |m: &TransportMessage| -> anyhow::Result<FeedResult> {
            if tag(m) == 9 {
                anyhow::bail!("boom")
            }
            Ok(FeedResult::success(m.clone()))
        })
        .with_scope(scope.clone());

        assert!(processor.process(vec![message(1), message(2)]).is_clean());
        assert!(processor.process(vec![message(1), message(9)]).has_faults());

        assert_eq!(scope.counts(), (2, 1, 1));
    }

    #[test]
    fn failed_begin_faults_whole_batch() {
        let processor = MessageProcessor::new("test", succeed_all)
            .with_scope(|| -> anyhow::Result<Box<dyn crate::processing::UnitOfWork>> { anyhow::bail!("no connection") });

        let result = processor.process(vec![message(1), message(2)]);

        assert!(result.successful().is_empty());
        assert_eq!(result.batch_faults()[0].unprocessed.len(), 2);
        assert_eq!(result.batch_faults()[0].batch_size, 2);
    }

    #[test]
    fn empty_batch_opens_no_scope() {
        let scope = CountingScope::default();
        let processor = MessageProcessor::new("test", succeed_all).with_scope(scope.clone());
        assert_eq!(processor.process(Vec::new()), FeedResult::empty());
        assert_eq!(scope.counts(), (0, 0, 0));
    }
}
