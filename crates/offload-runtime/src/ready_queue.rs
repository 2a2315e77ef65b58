//! Ready queue for the session scheduler
//!
//! Single FIFO owned by the scheduler thread. A session is pushed when it
//! becomes ready (registered, yielded, timer fired, job resolved, message
//! arrived) and resumed in that order.
//!
//! Cancellation does not search the queue; the scheduler drops ids of
//! sessions that no longer exist when they are popped.

use std::collections::VecDeque;

use offload_core::SessionId;

pub struct ReadyQueue {
    queue: VecDeque<SessionId>,
    total_pushed: u64,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            total_pushed: 0,
        }
    }

    #[inline]
    pub fn push(&mut self, id: SessionId) {
        self.queue.push_back(id);
        self.total_pushed += 1;
    }

    #[inline]
    pub fn pop(&mut self) -> Option<SessionId> {
        self.queue.pop_front()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}
