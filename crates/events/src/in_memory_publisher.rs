//! In-memory publisher for tests/dev.

use std::sync::Mutex;

use thiserror::Error;

use crate::publisher::Publisher;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InMemoryPublishError {
    /// Publish failed due to internal lock poisoning.
    #[error("publisher lock poisoned")]
    Poisoned,

    /// Failure injected with [`InMemoryPublisher::failing_after`].
    #[error("publication rejected after {0} message(s)")]
    Rejected(usize),
}

/// Records every published message in order.
///
/// - No IO / no async
/// - Optional failure injection to exercise the persisted-but-unpublished path
#[derive(Debug)]
pub struct InMemoryPublisher<M> {
    published: Mutex<Vec<M>>,
    fail_after: Option<usize>,
}

impl<M> InMemoryPublisher<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `accepted` messages, then reject every later one.
    pub fn failing_after(accepted: usize) -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            fail_after: Some(accepted),
        }
    }

    pub fn len(&self) -> usize {
        self.published.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<M: Clone> InMemoryPublisher<M> {
    /// Snapshot of everything published so far.
    pub fn published(&self) -> Vec<M> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl<M> Default for InMemoryPublisher<M> {
    fn default() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            fail_after: None,
        }
    }
}

impl<M> Publisher<M> for InMemoryPublisher<M>
where
    M: Clone + Send + Sync,
{
    type Error = InMemoryPublishError;

    fn publish(&self, message: &M) -> Result<(), Self::Error> {
        let mut published = self
            .published
            .lock()
            .map_err(|_| InMemoryPublishError::Poisoned)?;

        if let Some(limit) = self.fail_after {
            if published.len() >= limit {
                return Err(InMemoryPublishError::Rejected(limit));
            }
        }

        published.push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_publish_order() {
        let publisher = InMemoryPublisher::new();
        publisher.publish(&1).unwrap();
        publisher.publish(&2).unwrap();
        assert_eq!(publisher.published(), vec![1, 2]);
    }

    #[test]
    fn rejects_once_the_limit_is_reached() {
        let publisher = InMemoryPublisher::failing_after(1);
        publisher.publish(&"a").unwrap();
        assert_eq!(
            publisher.publish(&"b"),
            Err(InMemoryPublishError::Rejected(1))
        );
        assert_eq!(publisher.published(), vec!["a"]);
    }
}
