//! Runtime configuration for the transport and its consumers.
//!
//! Every struct deserializes from a partial document (missing fields fall back
//! to [`Default`]) and offers `with_*` builders for programmatic setup.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Capacity of one endpoint buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferCapacity {
    #[default]
    Unbounded,
    /// At most `n` queued messages; a send to a full endpoint is rejected for
    /// that endpoint without blocking the sender.
    Bounded(usize),
}

impl BufferCapacity {
    pub fn has_room(self, queued: usize) -> bool {
        match self {
            BufferCapacity::Unbounded => true,
            BufferCapacity::Bounded(limit) => queued < limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Capacity applied to every endpoint buffer.
    pub capacity: BufferCapacity,
    /// Timeout used by `dequeue_no_wait`.
    pub no_wait_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            capacity: BufferCapacity::Unbounded,
            no_wait_timeout_ms: 10,
        }
    }
}

impl TransportConfig {
    pub fn with_capacity(mut self, capacity: BufferCapacity) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_no_wait_timeout(mut self, timeout: Duration) -> Self {
        self.no_wait_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn no_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.no_wait_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Thread name, also used in log fields.
    pub name: String,
    /// Upper bound on messages handed to the processor at once.
    pub batch_size: usize,
    /// How long to block for the first message of a batch.
    pub poll_timeout_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            name: "endpoint-consumer".to_string(),
            batch_size: 32,
            poll_timeout_ms: 100,
        }
    }
}

impl ConsumerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}
