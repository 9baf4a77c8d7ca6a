use crate::types::{RelayError, RelayMessage, Result};
use std::collections::VecDeque;

/// Bounded FIFO buffer for messages awaiting a not-yet-ready upstream.
///
/// A message enters the queue only while the upstream connection is not
/// open. The queue is liveness-facing, not durable storage: exceeding the
/// bound fails fast with `QueueOverflow` instead of growing without limit.
#[derive(Debug)]
pub struct DeliveryQueue {
    entries: VecDeque<RelayMessage>,
    bound: usize,
}

impl DeliveryQueue {
    pub fn new(bound: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            bound,
        }
    }

    /// Appends a message at the tail.
    ///
    /// Fails with [`RelayError::QueueOverflow`] once the bound is reached.
    /// Existing entries are never dropped or reordered on overflow.
    pub fn enqueue(&mut self, message: RelayMessage) -> Result<()> {
        if self.entries.len() >= self.bound {
            return Err(RelayError::QueueOverflow(self.bound));
        }
        self.entries.push_back(message);
        Ok(())
    }

    /// Pops the message at the head, if any.
    pub fn pop(&mut self) -> Option<RelayMessage> {
        self.entries.pop_front()
    }

    /// Puts a message back at the head after a failed send, so a later
    /// drain retries it first. The entry was already admitted, so the
    /// bound is not re-checked here.
    pub fn requeue_front(&mut self, message: RelayMessage) {
        self.entries.push_front(message);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bound(&self) -> usize {
        self.bound
    }
}
