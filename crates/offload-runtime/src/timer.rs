//! Timer queue for sleeping sessions
//!
//! BinaryHeap min-heap keyed on deadline, owned by the scheduler thread
//! (no lock).
//!
//! # Complexity
//!
//! - Insert: O(log n)
//! - Cancel: O(1) (lazy cancellation)
//! - Poll expired: O(k log n) where k = number of expired timers
//! - Next deadline: O(1) amortized
//!
//! # Ordering
//!
//! Timers with equal deadlines fire in insertion order, so sessions that
//! went to sleep for the same instant wake FIFO.
//!
//! # Cancellation Strategy
//!
//! Cancelled keys go into a HashSet and are skipped when they surface at
//! the top of the heap. The set is cleared whenever the heap empties.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::{Duration, Instant};

use offload_core::SessionId;

/// Key returned by `insert`, used to cancel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey(u64);

struct HeapEntry {
    deadline: Instant,
    key: TimerKey,
    session: SessionId,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.key == other.key
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap; ties broken by insertion sequence
        match other.deadline.cmp(&self.deadline) {
            Ordering::Equal => other.key.0.cmp(&self.key.0),
            ord => ord,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimerStats {
    pub active: usize,
    pub pending_cancellations: usize,
    pub total_inserted: u64,
    pub total_fired: u64,
    pub total_cancelled: u64,
}

pub struct TimerQueue {
    heap: BinaryHeap<HeapEntry>,
    cancelled: HashSet<TimerKey>,
    next_key: u64,
    total_inserted: u64,
    total_fired: u64,
    total_cancelled: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            cancelled: HashSet::new(),
            next_key: 0,
            total_inserted: 0,
            total_fired: 0,
            total_cancelled: 0,
        }
    }

    /// Arm a timer that wakes `session` at `deadline`
    pub fn insert(&mut self, session: SessionId, deadline: Instant) -> TimerKey {
        let key = TimerKey(self.next_key);
        self.next_key += 1;
        self.heap.push(HeapEntry {
            deadline,
            key,
            session,
        });
        self.total_inserted += 1;
        key
    }

    /// Arm a timer `delay` from `now`
    ///
    /// Returns `None` without arming anything when the deadline is past
    /// the range of `Instant`.
    #[inline]
    pub fn insert_after(
        &mut self,
        session: SessionId,
        now: Instant,
        delay: Duration,
    ) -> Option<TimerKey> {
        let deadline = now.checked_add(delay)?;
        Some(self.insert(session, deadline))
    }

    /// Cancel a timer; returns false if already cancelled
    ///
    /// Cancelling a timer that already fired is harmless.
    pub fn cancel(&mut self, key: TimerKey) -> bool {
        let inserted = self.cancelled.insert(key);
        if inserted {
            self.total_cancelled += 1;
        }
        inserted
    }

    /// Pop every timer due at `now`, in deadline (then insertion) order
    pub fn poll_expired(&mut self, now: Instant, out: &mut Vec<SessionId>) {
        while let Some(top) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            let Some(entry) = self.heap.pop() else { break };
            if self.cancelled.remove(&entry.key) {
                continue;
            }
            self.total_fired += 1;
            out.push(entry.session);
        }

        if self.heap.is_empty() {
            self.cancelled.clear();
        }
    }

    /// Earliest live deadline, discarding cancelled entries on top
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(top) = self.heap.peek() {
            if !self.cancelled.contains(&top.key) {
                return Some(top.deadline);
            }
            let key = top.key;
            self.heap.pop();
            self.cancelled.remove(&key);
        }
        self.cancelled.clear();
        None
    }

    /// Live timers (cancelled ones still in the heap are not counted)
    pub fn len(&self) -> usize {
        self.heap.len().saturating_sub(self.cancelled.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> TimerStats {
        TimerStats {
            active: self.len(),
            pending_cancellations: self.cancelled.len(),
            total_inserted: self.total_inserted,
            total_fired: self.total_fired,
            total_cancelled: self.total_cancelled,
        }
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}
