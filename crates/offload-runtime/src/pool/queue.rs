//! Pool job queue
//!
//! Design:
//! - One FIFO (VecDeque) behind a Mutex, Condvar for idle workers
//! - Optional admission limit checked under the same lock as the push
//! - `close()` lets workers drain what is left, then `pop` returns None

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use offload_core::{JobFn, JobId, JobSlot, OffloadError, OffloadResult};

/// A validated job waiting for a worker
pub(crate) struct QueuedJob {
    pub slot: JobSlot,
    pub function: JobFn,
}

struct QueueState {
    items: VecDeque<QueuedJob>,
    closed: bool,
}

pub(crate) struct JobQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    limit: Option<usize>,
}

impl JobQueue {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(limit.unwrap_or(64).min(4096)),
                closed: false,
            }),
            available: Condvar::new(),
            limit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue, or reject synchronously when closed or at the limit
    pub fn push(&self, job: QueuedJob) -> OffloadResult<()> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(OffloadError::PoolShutDown);
            }
            if let Some(limit) = self.limit {
                if state.items.len() >= limit {
                    return Err(OffloadError::PoolSaturated { limit });
                }
            }
            state.items.push_back(job);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Next job for a worker; blocks while the queue is open and empty
    ///
    /// Returns None once the queue is closed and drained.
    pub fn pop(&self) -> Option<QueuedJob> {
        let mut state = self.lock();
        loop {
            if let Some(job) = state.items.pop_front() {
                return Some(job);
            }
            if state.closed {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Pull a specific job out of the queue (cancellation)
    pub fn remove(&self, id: JobId) -> Option<QueuedJob> {
        let mut state = self.lock();
        let pos = state.items.iter().position(|job| job.slot.id() == id)?;
        state.items.remove(pos)
    }

    /// Take every queued job
    pub fn drain(&self) -> Vec<QueuedJob> {
        self.lock().items.drain(..).collect()
    }

    /// Refuse new jobs and wake idle workers so they can exit
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offload_core::{job_channel, JobPayload, Value};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn job(n: u64) -> QueuedJob {
        let (slot, _handle) = job_channel(JobId::new(n), JobPayload::new("noop", vec![]), None);
        QueuedJob {
            slot,
            function: Arc::new(|_| Ok(Value::Unit)),
        }
    }

    #[test]
    fn test_fifo_and_limit() {
        let q = JobQueue::new(Some(2));
        q.push(job(1)).unwrap();
        q.push(job(2)).unwrap();
        assert_eq!(
            q.push(job(3)).unwrap_err(),
            OffloadError::PoolSaturated { limit: 2 }
        );
        assert_eq!(q.pop().map(|j| j.slot.id()), Some(JobId::new(1)));
        q.push(job(4)).unwrap();
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_remove_and_drain() {
        let q = JobQueue::new(None);
        for n in 1..=4 {
            q.push(job(n)).unwrap();
        }
        assert!(q.remove(JobId::new(2)).is_some());
        assert!(q.remove(JobId::new(2)).is_none());
        let ids: Vec<_> = q.drain().iter().map(|j| j.slot.id().as_u64()).collect();
        assert_eq!(ids, vec![1, 3, 4]);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn test_close_releases_waiters() {
        let q = Arc::new(JobQueue::new(None));
        let q2 = Arc::clone(&q);
        let waiter = thread::spawn(move || q2.pop().is_none());

        thread::sleep(Duration::from_millis(30));
        q.close();
        assert!(waiter.join().unwrap());
        assert_eq!(q.push(job(1)).unwrap_err(), OffloadError::PoolShutDown);
    }

    #[test]
    fn test_closed_queue_still_drains() {
        let q = JobQueue::new(None);
        q.push(job(1)).unwrap();
        q.close();
        assert!(q.pop().is_some());
        assert!(q.pop().is_none());
    }
}
