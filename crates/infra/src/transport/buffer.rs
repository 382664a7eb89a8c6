//! FIFO endpoint buffer with blocking pop.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use evented_events::EndpointMessage;

use crate::config::BufferCapacity;

#[derive(Debug)]
pub(crate) struct EndpointBuffer {
    queue: Mutex<VecDeque<EndpointMessage>>,
    ready: Condvar,
    capacity: BufferCapacity,
}

impl EndpointBuffer {
    pub(crate) fn new(capacity: BufferCapacity) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue unless the buffer is full. Never blocks on capacity.
    pub(crate) fn push(&self, message: EndpointMessage) -> bool {
        let mut queue = self.queue.lock();
        if !self.capacity.has_room(queue.len()) {
            return false;
        }
        queue.push_back(message);
        drop(queue);
        self.ready.notify_one();
        true
    }

    /// Pop the oldest message, waiting up to `timeout` for one to arrive.
    pub(crate) fn pop_timeout(&self, timeout: Duration) -> Option<EndpointMessage> {
        let deadline = Instant::now().checked_add(timeout);
        let mut queue = self.queue.lock();
        loop {
            if let Some(message) = queue.pop_front() {
                return Some(message);
            }
            match deadline {
                Some(deadline) => {
                    if self.ready.wait_until(&mut queue, deadline).timed_out() {
                        return queue.pop_front();
                    }
                }
                None => self.ready.wait(&mut queue),
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.queue.lock().len()
    }
}
