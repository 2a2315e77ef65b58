//! Worker thread main loop
//!
//! A worker takes the next queued job, runs its function, and resolves the
//! job's slot. It never holds a lock while user code runs.
//!
//! A job function that returns `Err` is an ordinary failure. A job function
//! that panics unwinds the worker thread: `CrashGuard` runs during the
//! unwind, resolves the in-flight job as `WorkerLost`, and hands the worker
//! id to the monitor for respawn.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use offload_core::kwarn;
use offload_core::{
    Event, FailureCause, JobFailure, JobSlot, OffloadError, OffloadResult, Value, WorkerId,
};

use super::PoolInner;

/// Spawn the thread for worker `id`
pub(crate) fn spawn_worker(inner: &Arc<PoolInner>, id: WorkerId) -> OffloadResult<JoinHandle<()>> {
    let inner = Arc::clone(inner);
    thread::Builder::new()
        .name(format!("offload-worker-{}", id.as_usize()))
        .spawn(move || worker_loop(inner, id))
        .map_err(|e| OffloadError::SpawnFailed(e.to_string()))
}

struct CrashGuard<'a> {
    inner: &'a PoolInner,
    id: WorkerId,
}

impl Drop for CrashGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.inner.worker_crashed(self.id);
        }
    }
}

fn worker_loop(inner: Arc<PoolInner>, id: WorkerId) {
    let _guard = CrashGuard { inner: &inner, id };

    while let Some(job) = inner.queue.pop() {
        // Cancelled between push and pop
        if !job.slot.try_start() {
            continue;
        }

        inner.begin_job(id, &job.slot);
        let outcome = (job.function)(&job.slot.payload().args);
        inner.end_job(id, &job.slot, outcome);
    }

    inner.worker_exited();
}

impl PoolInner {
    fn begin_job(&self, id: WorkerId, slot: &JobSlot) {
        *self.workers[id.as_usize()].current() = Some(slot.clone());
        let busy = self.busy.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_busy.fetch_max(busy, Ordering::AcqRel);
    }

    fn end_job(&self, id: WorkerId, slot: &JobSlot, outcome: Result<Value, String>) {
        self.workers[id.as_usize()].current().take();
        self.busy.fetch_sub(1, Ordering::AcqRel);

        let job = slot.id();
        match outcome {
            Ok(value) => {
                if slot.resolve(Ok(value)) {
                    self.stats.completed.fetch_add(1, Ordering::Relaxed);
                    self.emit(&Event::JobCompleted { job, worker: id });
                }
            }
            Err(message) => {
                let cause = FailureCause::Raised(message);
                if slot.resolve(Err(JobFailure::new(job, cause.clone()))) {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    self.emit(&Event::JobFailed { job, cause });
                }
            }
        }
    }

    /// Called from the unwinding worker thread
    fn worker_crashed(&self, id: WorkerId) {
        let lost = self.workers[id.as_usize()].current().take();
        let job = lost.as_ref().map(JobSlot::id);
        if lost.is_some() {
            self.busy.fetch_sub(1, Ordering::AcqRel);
        }

        self.stats.crashed.fetch_add(1, Ordering::Relaxed);
        kwarn!("{}", OffloadError::WorkerCrash { worker: id, job });
        self.emit(&Event::WorkerCrashed { worker: id, job });

        if let Some(slot) = lost {
            let cause = FailureCause::WorkerLost { worker: id };
            if slot.resolve(Err(JobFailure::new(slot.id(), cause.clone()))) {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                self.emit(&Event::JobFailed { job: slot.id(), cause });
            }
        }

        self.crashes.push(id);
        self.monitor_parker.unpark();
    }
}
