//! Single-assignment result slot for one job
//!
//! `job_channel` creates the two halves:
//!
//! - `JobSlot` - producer side, held by the pool. Cloneable so the queue,
//!   the worker and the worker's crash guard can all reach it. Only the
//!   first `resolve` wins.
//! - `JobHandle` - consumer side, handed to the submitter. Not cloneable;
//!   the outcome can be taken exactly once.
//!
//! State transitions:
//!
//! ```text
//! Submitted ──try_start──► Running ──resolve──► Completed | Failed | Cancelled
//!     │                                              ▲
//!     └──────────── cancel_if_queued ────────────────┘
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{FailureCause, JobFailure, JobOutcome};
use crate::id::JobId;
use crate::job::JobPayload;
use crate::state::JobState;
use crate::traits::CompletionSink;

struct Cell {
    resolved: bool,
    outcome: Option<JobOutcome>,
}

struct Shared {
    id: JobId,
    payload: JobPayload,
    state: AtomicU8,
    cell: Mutex<Cell>,
    ready: Condvar,
    sink: Option<Arc<dyn CompletionSink>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Cell> {
        self.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> JobState {
        JobState::from(self.state.load(Ordering::Acquire))
    }
}

/// Create the producer/consumer halves for a new job
pub fn job_channel(
    id: JobId,
    payload: JobPayload,
    sink: Option<Arc<dyn CompletionSink>>,
) -> (JobSlot, JobHandle) {
    let shared = Arc::new(Shared {
        id,
        payload,
        state: AtomicU8::new(JobState::Submitted as u8),
        cell: Mutex::new(Cell {
            resolved: false,
            outcome: None,
        }),
        ready: Condvar::new(),
        sink,
    });
    (
        JobSlot {
            shared: Arc::clone(&shared),
        },
        JobHandle { shared },
    )
}

/// Producer half of a job's result slot
#[derive(Clone)]
pub struct JobSlot {
    shared: Arc<Shared>,
}

impl JobSlot {
    #[inline]
    pub fn id(&self) -> JobId {
        self.shared.id
    }

    #[inline]
    pub fn payload(&self) -> &JobPayload {
        &self.shared.payload
    }

    #[inline]
    pub fn state(&self) -> JobState {
        self.shared.state()
    }

    /// Claim the job for execution
    ///
    /// Returns false if it was cancelled (or otherwise resolved) while queued;
    /// the worker must then skip it.
    pub fn try_start(&self) -> bool {
        self.shared
            .state
            .compare_exchange(
                JobState::Submitted as u8,
                JobState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Cancel a job no worker has claimed yet
    ///
    /// Returns false if a worker already started it or it is resolved.
    pub fn cancel_if_queued(&self) -> bool {
        let claimed = self
            .shared
            .state
            .compare_exchange(
                JobState::Submitted as u8,
                JobState::Cancelled as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if claimed {
            self.resolve(Err(JobFailure::cancelled(self.id())));
        }
        claimed
    }

    /// Write the outcome. First writer wins; later calls return false.
    pub fn resolve(&self, outcome: JobOutcome) -> bool {
        let state = match &outcome {
            Ok(_) => JobState::Completed,
            Err(f) if matches!(f.cause, FailureCause::Cancelled) => JobState::Cancelled,
            Err(_) => JobState::Failed,
        };

        {
            let mut cell = self.shared.lock();
            if cell.resolved {
                return false;
            }
            cell.resolved = true;
            cell.outcome = Some(outcome);
            self.shared.state.store(state as u8, Ordering::Release);
        }
        self.shared.ready.notify_all();

        if let Some(sink) = &self.shared.sink {
            sink.job_resolved(self.shared.id);
        }
        true
    }
}

/// Consumer half of a job's result slot
pub struct JobHandle {
    shared: Arc<Shared>,
}

impl JobHandle {
    #[inline]
    pub fn id(&self) -> JobId {
        self.shared.id
    }

    #[inline]
    pub fn state(&self) -> JobState {
        self.shared.state()
    }

    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.shared.lock().resolved
    }

    /// Take the outcome if the job has resolved (non-blocking)
    ///
    /// Returns `None` before resolution and after the outcome was taken.
    pub fn try_take(&mut self) -> Option<JobOutcome> {
        self.shared.lock().outcome.take()
    }

    /// Block the calling thread until the job resolves
    ///
    /// Never call this on the scheduler thread; sessions suspend with
    /// `Step::AwaitJob` instead.
    pub fn wait(self) -> JobOutcome {
        let mut cell = self.shared.lock();
        loop {
            if let Some(outcome) = cell.outcome.take() {
                return outcome;
            }
            if cell.resolved {
                // Already taken through try_take/wait_timeout
                return Err(JobFailure::cancelled(self.shared.id));
            }
            cell = self
                .shared
                .ready
                .wait(cell)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block up to `timeout`; `None` if still unresolved
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<JobOutcome> {
        // Past the clock's range there is no deadline to honour
        let deadline = Instant::now().checked_add(timeout);
        let mut cell = self.shared.lock();
        loop {
            if cell.resolved {
                return cell.outcome.take();
            }
            cell = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.shared
                        .ready
                        .wait_timeout(cell, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .shared
                    .ready
                    .wait(cell)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.shared.id)
            .field("kind", &self.shared.payload.kind)
            .field("state", &self.shared.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    struct CountingSink(AtomicUsize);

    impl CompletionSink for CountingSink {
        fn job_resolved(&self, _job: JobId) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn payload() -> JobPayload {
        JobPayload::unary("noop", Value::Unit)
    }

    #[test]
    fn test_resolve_once() {
        let (slot, mut handle) = job_channel(JobId::new(1), payload(), None);
        assert!(slot.try_start());
        assert_eq!(handle.state(), JobState::Running);
        assert!(handle.try_take().is_none());

        assert!(slot.resolve(Ok(Value::Int(1))));
        assert!(!slot.resolve(Ok(Value::Int(2))));

        assert_eq!(handle.state(), JobState::Completed);
        assert_eq!(handle.try_take(), Some(Ok(Value::Int(1))));
        assert_eq!(handle.try_take(), None);
    }

    #[test]
    fn test_cancel_if_queued() {
        let (slot, handle) = job_channel(JobId::new(2), payload(), None);
        assert!(slot.cancel_if_queued());
        assert!(!slot.try_start());
        assert_eq!(handle.state(), JobState::Cancelled);
        assert_eq!(handle.wait(), Err(JobFailure::cancelled(JobId::new(2))));
    }

    #[test]
    fn test_cancel_after_start_fails() {
        let (slot, _handle) = job_channel(JobId::new(3), payload(), None);
        assert!(slot.try_start());
        assert!(!slot.cancel_if_queued());
        assert_eq!(slot.state(), JobState::Running);
    }

    #[test]
    fn test_sink_notified_once() {
        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let (slot, _handle) = job_channel(JobId::new(4), payload(), Some(sink.clone()));
        slot.resolve(Err(JobFailure::raised(JobId::new(4), "x")));
        slot.resolve(Ok(Value::Unit));
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wait_across_threads() {
        let (slot, handle) = job_channel(JobId::new(5), payload(), None);
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            slot.try_start();
            slot.resolve(Ok(Value::from("done")))
        });
        assert_eq!(handle.wait(), Ok(Value::from("done")));
        assert!(producer.join().unwrap());
    }

    #[test]
    fn test_wait_timeout_expires() {
        let (_slot, mut handle) = job_channel(JobId::new(6), payload(), None);
        let start = Instant::now();
        assert!(handle.wait_timeout(Duration::from_millis(30)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_wait_timeout_unbounded() {
        let (slot, mut handle) = job_channel(JobId::new(7), payload(), None);
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            slot.try_start();
            slot.resolve(Ok(Value::Int(7)))
        });
        assert_eq!(handle.wait_timeout(Duration::MAX), Some(Ok(Value::Int(7))));
        assert!(producer.join().unwrap());
    }
}
