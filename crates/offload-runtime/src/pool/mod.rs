//! Offload pool
//!
//! A fixed set of worker threads executing registered job functions in true
//! parallelism. Design:
//!
//! - All workers spawned up front by `start()`, one per `worker_count`
//! - Jobs validated against the `JobRegistry` before they are queued
//! - One FIFO queue (`queue::JobQueue`); any idle worker takes the next job
//! - Results travel back through the job's `JobSlot`, optionally notifying
//!   a `CompletionSink` (the scheduler)
//! - A worker that panics is replaced by the monitor thread with the same
//!   `WorkerId`; its in-flight job resolves as `WorkerLost`
//!
//! ```text
//!   submit ──> [ JobQueue ] ──> worker 0 ──┐
//!                   │      └──> worker 1 ──┼──> JobSlot::resolve ──> sink
//!                   │      └──> worker N ──┘
//!                   │                │ panic
//!                   │                v
//!                   └────────── monitor (join + respawn)
//! ```

mod monitor;
mod queue;
mod worker;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;

use offload_core::{
    job_channel, CompletionSink, Event, EventSink, JobFailure, JobHandle, JobId, JobPayload,
    JobRegistry, JobSlot, OffloadError, OffloadResult, WorkerId,
};
use offload_core::{kdebug, kinfo, kwarn};

use crate::config::{RuntimeConfig, ShutdownMode};
use crate::parking::{new_parker, Parker};

use queue::{JobQueue, QueuedJob};

/// Point-in-time pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Configured worker count
    pub workers: usize,
    /// Worker threads currently alive (respawns included)
    pub live_workers: usize,
    /// Workers executing a job right now
    pub busy: usize,
    /// Jobs waiting for a worker
    pub queued: usize,
    /// Highest `busy` seen since start or the last `reset_peak`
    pub peak_busy: usize,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub crashed: u64,
    pub respawned: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    crashed: AtomicU64,
    respawned: AtomicU64,
}

/// Per-worker bookkeeping, indexed by `WorkerId`
struct WorkerSlot {
    current: Mutex<Option<JobSlot>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU32,
}

impl WorkerSlot {
    fn new() -> Self {
        Self {
            current: Mutex::new(None),
            thread: Mutex::new(None),
            generation: AtomicU32::new(0),
        }
    }

    fn current(&self) -> MutexGuard<'_, Option<JobSlot>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn thread(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.thread.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// State shared by the pool handle, its workers and the monitor
pub(crate) struct PoolInner {
    registry: JobRegistry,
    queue: JobQueue,
    workers: Vec<WorkerSlot>,
    events: Arc<dyn EventSink>,

    next_job: AtomicU64,
    accepting: AtomicBool,
    monitor_stop: AtomicBool,

    busy: AtomicUsize,
    peak_busy: AtomicUsize,
    stats: Counters,

    /// Worker threads alive; the monitor keeps this steady across respawns
    live: Mutex<usize>,
    all_exited: Condvar,

    crashes: SegQueue<WorkerId>,
    monitor_parker: Box<dyn Parker>,
}

impl PoolInner {
    fn emit(&self, event: &Event) {
        self.events.on_event(event);
    }

    fn live(&self) -> MutexGuard<'_, usize> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn worker_exited(&self) {
        let mut live = self.live();
        *live = live.saturating_sub(1);
        if *live == 0 {
            self.all_exited.notify_all();
        }
    }

    /// Wait until every worker has exited or `deadline` passes
    fn wait_workers(&self, deadline: Option<Instant>) -> bool {
        let mut live = self.live();
        while *live > 0 {
            live = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.all_exited
                        .wait_timeout(live, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .all_exited
                    .wait(live)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
        true
    }

    /// Resolve a job that never ran as cancelled
    fn cancel_queued(&self, job: QueuedJob) -> bool {
        if job.slot.cancel_if_queued() {
            self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            self.emit(&Event::JobCancelled { job: job.slot.id() });
            true
        } else {
            false
        }
    }
}

/// Fixed-size pool of worker threads
///
/// Shared as `Arc<OffloadPool>`; every method takes `&self`.
pub struct OffloadPool {
    inner: Arc<PoolInner>,
    worker_count: usize,
    shutdown_mode: ShutdownMode,
    shutdown_timeout: Duration,
    monitor: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl OffloadPool {
    /// Validate `config` and spawn every worker plus the monitor
    pub fn start(
        config: &RuntimeConfig,
        registry: JobRegistry,
        events: Arc<dyn EventSink>,
    ) -> OffloadResult<Arc<Self>> {
        config.validate()?;

        let inner = Arc::new(PoolInner {
            registry,
            queue: JobQueue::new(config.job_queue_limit),
            workers: (0..config.worker_count).map(|_| WorkerSlot::new()).collect(),
            events,
            next_job: AtomicU64::new(1),
            accepting: AtomicBool::new(true),
            monitor_stop: AtomicBool::new(false),
            busy: AtomicUsize::new(0),
            peak_busy: AtomicUsize::new(0),
            stats: Counters::default(),
            live: Mutex::new(0),
            all_exited: Condvar::new(),
            crashes: SegQueue::new(),
            monitor_parker: new_parker(),
        });

        let pool = Arc::new(Self {
            inner: Arc::clone(&inner),
            worker_count: config.worker_count,
            shutdown_mode: config.shutdown_mode,
            shutdown_timeout: config.shutdown_timeout,
            monitor: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        });

        for i in 0..config.worker_count {
            let id = WorkerId::new(i as u16);
            *inner.live() += 1;
            match worker::spawn_worker(&inner, id) {
                Ok(handle) => *inner.workers[i].thread() = Some(handle),
                Err(e) => {
                    inner.worker_exited();
                    // Dropping `pool` shuts down what was already spawned
                    return Err(e);
                }
            }
        }

        let monitor = monitor::spawn_monitor(&inner)?;
        *pool.monitor_handle() = Some(monitor);

        kdebug!(
            "offload pool started: {} workers, queue limit {:?}, {} job kinds",
            config.worker_count,
            config.job_queue_limit,
            inner.registry.len()
        );
        Ok(pool)
    }

    fn monitor_handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.monitor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a job; returns immediately
    pub fn submit(&self, payload: JobPayload) -> OffloadResult<JobHandle> {
        self.enqueue(payload, None)
    }

    /// Queue a job and notify `sink` when it resolves
    pub fn submit_with_sink(
        &self,
        payload: JobPayload,
        sink: Arc<dyn CompletionSink>,
    ) -> OffloadResult<JobHandle> {
        self.enqueue(payload, Some(sink))
    }

    /// Submit and block the calling thread until the job resolves
    ///
    /// For callers outside the scheduler (demos, setup code). Never call it
    /// from a session step.
    pub fn run_blocking(&self, payload: JobPayload) -> OffloadResult<offload_core::Value> {
        self.submit(payload)?.wait().map_err(OffloadError::Job)
    }

    fn enqueue(
        &self,
        payload: JobPayload,
        sink: Option<Arc<dyn CompletionSink>>,
    ) -> OffloadResult<JobHandle> {
        let inner = &self.inner;
        if !inner.accepting.load(Ordering::Acquire) {
            return Err(OffloadError::PoolShutDown);
        }

        let function = inner.registry.validate(&payload)?;
        let id = JobId::new(inner.next_job.fetch_add(1, Ordering::Relaxed));
        let kind = payload.kind.clone();
        let (slot, handle) = job_channel(id, payload, sink);

        inner.queue.push(QueuedJob { slot, function })?;
        inner.stats.submitted.fetch_add(1, Ordering::Relaxed);
        inner.emit(&Event::JobSubmitted { job: id, kind });
        Ok(handle)
    }

    /// Cancel a job that has not started; returns whether it was queued
    ///
    /// A running job is never interrupted.
    pub fn cancel(&self, job: JobId) -> bool {
        match self.inner.queue.remove(job) {
            Some(queued) => self.inner.cancel_queued(queued),
            None => false,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.inner.registry
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        let inner = &self.inner;
        let s = &inner.stats;
        PoolStats {
            workers: self.worker_count,
            live_workers: *inner.live(),
            busy: inner.busy.load(Ordering::Acquire),
            queued: inner.queue.len(),
            peak_busy: inner.peak_busy.load(Ordering::Acquire),
            submitted: s.submitted.load(Ordering::Relaxed),
            completed: s.completed.load(Ordering::Relaxed),
            failed: s.failed.load(Ordering::Relaxed),
            cancelled: s.cancelled.load(Ordering::Relaxed),
            crashed: s.crashed.load(Ordering::Relaxed),
            respawned: s.respawned.load(Ordering::Relaxed),
        }
    }

    /// Restart peak tracking from the current busy count
    pub fn reset_peak(&self) {
        let busy = self.inner.busy.load(Ordering::Acquire);
        self.inner.peak_busy.store(busy, Ordering::Release);
    }

    /// Stop accepting jobs and wind the workers down
    ///
    /// `Drain` runs every queued job first; `Cancel` resolves queued jobs as
    /// cancelled right away. Either way the pool waits up to
    /// `shutdown_timeout` for the workers. Jobs still unresolved after that
    /// resolve as cancelled, their threads are detached, and the call
    /// returns `ShutdownTimeout`. Calling it again is a no-op.
    pub fn shutdown(&self) -> OffloadResult<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let inner = &self.inner;
        inner.accepting.store(false, Ordering::Release);

        if self.shutdown_mode == ShutdownMode::Cancel {
            let mut n = 0;
            for job in inner.queue.drain() {
                if inner.cancel_queued(job) {
                    n += 1;
                }
            }
            if n > 0 {
                kdebug!("shutdown: cancelled {} queued jobs", n);
            }
        }
        inner.queue.close();

        // A timeout past the clock's range means wait for as long as it takes
        let deadline = Instant::now().checked_add(self.shutdown_timeout);
        let finished = inner.wait_workers(deadline);

        // Nothing left may stay pending: stuck jobs plus anything a lost
        // worker never picked up
        let mut abandoned = 0usize;
        for slot in &inner.workers {
            if let Some(job) = slot.current().take() {
                if job.resolve(Err(JobFailure::cancelled(job.id()))) {
                    inner.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                    inner.emit(&Event::JobCancelled { job: job.id() });
                    abandoned += 1;
                }
            }
        }
        for job in inner.queue.drain() {
            if inner.cancel_queued(job) {
                abandoned += 1;
            }
        }

        inner.monitor_stop.store(true, Ordering::Release);
        inner.monitor_parker.unpark();
        if let Some(monitor) = self.monitor_handle().take() {
            let _ = monitor.join();
        }

        for slot in &inner.workers {
            if let Some(handle) = slot.thread().take() {
                if handle.is_finished() {
                    let _ = handle.join();
                }
                // else: detached
            }
        }

        inner.emit(&Event::PoolShutdown { abandoned });

        if finished && abandoned == 0 {
            kdebug!("offload pool shut down cleanly");
            Ok(())
        } else {
            kwarn!(
                "offload pool shutdown timed out after {:?}: {} jobs abandoned",
                self.shutdown_timeout,
                abandoned
            );
            Err(OffloadError::ShutdownTimeout { abandoned })
        }
    }
}

impl Drop for OffloadPool {
    fn drop(&mut self) {
        if !self.is_shut_down() {
            if let Err(e) = self.shutdown() {
                kinfo!("offload pool dropped: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offload_core::{Arity, FailureCause, JobState, NullSink, Value};
    use std::sync::Barrier;
    use std::thread;

    fn registry() -> JobRegistry {
        let mut r = JobRegistry::new();
        r.register("double", Arity::Exact(1), |args| {
            let n = args[0].as_int().ok_or("expected int")?;
            Ok(Value::Int(n * 2))
        })
        .register("fail", Arity::Any, |_| Err("boom".to_string()))
        .register("sleep_ms", Arity::Exact(1), |args| {
            let ms = args[0].as_uint().unwrap_or(0);
            thread::sleep(Duration::from_millis(ms));
            Ok(Value::Unit)
        })
        .register("panic", Arity::Any, |_| panic!("job panicked on purpose"));
        r
    }

    fn pool(workers: usize) -> Arc<OffloadPool> {
        let config = RuntimeConfig::new()
            .worker_count(workers)
            .shutdown_timeout(Duration::from_secs(5));
        OffloadPool::start(&config, registry(), Arc::new(NullSink)).unwrap()
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_submit_and_wait() {
        let pool = pool(2);
        let handle = pool.submit(JobPayload::unary("double", 21i64)).unwrap();
        assert_eq!(handle.wait(), Ok(Value::Int(42)));
        assert_eq!(pool.run_blocking(JobPayload::unary("double", 5i64)), Ok(Value::Int(10)));
        pool.shutdown().unwrap();
    }

    #[test]
    fn test_validation_rejects_before_queueing() {
        let pool = pool(1);
        assert!(matches!(
            pool.submit(JobPayload::new("nope", vec![])),
            Err(OffloadError::UnknownJobKind(_))
        ));
        assert!(matches!(
            pool.submit(JobPayload::new("double", vec![])),
            Err(OffloadError::InvalidArguments { .. })
        ));
        assert_eq!(pool.stats().submitted, 0);
    }

    #[test]
    fn test_raised_failure_keeps_worker() {
        let pool = pool(1);
        let failed = pool.submit(JobPayload::new("fail", vec![])).unwrap().wait();
        let failure = failed.unwrap_err();
        assert_eq!(failure.cause, FailureCause::Raised("boom".to_string()));

        // Resubmission yields an independent outcome
        let ok = pool.submit(JobPayload::unary("double", 1i64)).unwrap().wait();
        assert_eq!(ok, Ok(Value::Int(2)));

        // Counters trail the handle by a moment
        assert!(wait_for(|| {
            let stats = pool.stats();
            stats.failed == 1 && stats.completed == 1
        }));
        assert_eq!(pool.stats().crashed, 0);
    }

    #[test]
    fn test_jobs_run_in_parallel() {
        let workers = 4;
        let mut r = JobRegistry::new();
        let barrier = Arc::new(Barrier::new(workers));
        let b = Arc::clone(&barrier);
        // Only completes if all four run at the same time
        r.register("meet", Arity::Any, move |_| {
            b.wait();
            Ok(Value::Unit)
        });
        let config = RuntimeConfig::new().worker_count(workers);
        let pool = OffloadPool::start(&config, r, Arc::new(NullSink)).unwrap();

        let handles: Vec<_> = (0..workers)
            .map(|_| pool.submit(JobPayload::new("meet", vec![])).unwrap())
            .collect();
        for h in handles {
            assert_eq!(h.wait(), Ok(Value::Unit));
        }
        assert_eq!(pool.stats().peak_busy, workers);
    }

    #[test]
    fn test_queue_limit_saturates() {
        let config = RuntimeConfig::new().worker_count(1).job_queue_limit(Some(1));
        let pool = OffloadPool::start(&config, registry(), Arc::new(NullSink)).unwrap();

        let running = pool.submit(JobPayload::unary("sleep_ms", 200u64)).unwrap();
        assert!(wait_for(|| pool.stats().busy == 1));

        let queued = pool.submit(JobPayload::unary("sleep_ms", 1u64)).unwrap();
        assert_eq!(
            pool.submit(JobPayload::unary("sleep_ms", 1u64)).unwrap_err(),
            OffloadError::PoolSaturated { limit: 1 }
        );

        assert!(running.wait().is_ok());
        assert!(queued.wait().is_ok());
    }

    #[test]
    fn test_cancel_queued_job() {
        let pool = pool(1);
        let running = pool.submit(JobPayload::unary("sleep_ms", 100u64)).unwrap();
        assert!(wait_for(|| pool.stats().busy == 1));

        let queued = pool.submit(JobPayload::unary("double", 3i64)).unwrap();
        assert!(pool.cancel(queued.id()));
        assert!(!pool.cancel(queued.id()));
        assert_eq!(queued.state(), JobState::Cancelled);
        assert!(queued.wait().unwrap_err().is_cancelled());

        // Running jobs are not interrupted
        assert!(!pool.cancel(running.id()));
        assert!(running.wait().is_ok());
        assert_eq!(pool.stats().cancelled, 1);
    }

    #[test]
    fn test_crash_resolves_worker_lost_and_respawns() {
        let pool = pool(2);
        let crashed = pool.submit(JobPayload::new("panic", vec![])).unwrap().wait();
        assert!(crashed.unwrap_err().is_worker_lost());

        assert!(wait_for(|| pool.stats().respawned == 1));
        let stats = pool.stats();
        assert_eq!(stats.crashed, 1);
        assert_eq!(stats.live_workers, 2);

        // Capacity restored: both workers busy at once again
        pool.reset_peak();
        let handles: Vec<_> = (0..2)
            .map(|_| pool.submit(JobPayload::unary("sleep_ms", 150u64)).unwrap())
            .collect();
        for h in handles {
            assert!(h.wait().is_ok());
        }
        assert_eq!(pool.stats().peak_busy, 2);
        pool.shutdown().unwrap();
    }

    #[test]
    fn test_shutdown_drain_runs_queued() {
        let pool = pool(1);
        let handles: Vec<_> = (0..3i64)
            .map(|n| pool.submit(JobPayload::unary("double", n)).unwrap())
            .collect();
        pool.shutdown().unwrap();
        for (n, h) in handles.into_iter().enumerate() {
            assert_eq!(h.wait(), Ok(Value::Int(n as i64 * 2)));
        }
        assert_eq!(
            pool.submit(JobPayload::unary("double", 1i64)).unwrap_err(),
            OffloadError::PoolShutDown
        );
        // Idempotent
        assert!(pool.shutdown().is_ok());
    }

    #[test]
    fn test_shutdown_cancel_mode() {
        let config = RuntimeConfig::new()
            .worker_count(1)
            .shutdown_mode(ShutdownMode::Cancel);
        let pool = OffloadPool::start(&config, registry(), Arc::new(NullSink)).unwrap();

        let running = pool.submit(JobPayload::unary("sleep_ms", 100u64)).unwrap();
        assert!(wait_for(|| pool.stats().busy == 1));
        let queued = pool.submit(JobPayload::unary("double", 2i64)).unwrap();

        pool.shutdown().unwrap();
        assert!(running.wait().is_ok());
        assert!(queued.wait().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_shutdown_timeout_abandons() {
        let config = RuntimeConfig::new()
            .worker_count(1)
            .shutdown_timeout(Duration::from_millis(50));
        let pool = OffloadPool::start(&config, registry(), Arc::new(NullSink)).unwrap();

        let stuck = pool.submit(JobPayload::unary("sleep_ms", 1_000u64)).unwrap();
        assert!(wait_for(|| pool.stats().busy == 1));

        assert_eq!(
            pool.shutdown().unwrap_err(),
            OffloadError::ShutdownTimeout { abandoned: 1 }
        );
        assert!(stuck.wait().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_shutdown_with_unbounded_timeout() {
        let config = RuntimeConfig::new()
            .worker_count(1)
            .shutdown_timeout(Duration::MAX);
        assert!(config.validate().is_ok());
        let pool = OffloadPool::start(&config, registry(), Arc::new(NullSink)).unwrap();

        let running = pool.submit(JobPayload::unary("sleep_ms", 50u64)).unwrap();
        assert!(wait_for(|| pool.stats().busy == 1));
        assert!(pool.shutdown().is_ok());
        assert!(running.wait().is_ok());
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<Event>>);

    impl Collect {
        fn names(&self) -> Vec<&'static str> {
            self.0.lock().unwrap().iter().map(Event::name).collect()
        }
    }

    impl EventSink for Collect {
        fn on_event(&self, event: &Event) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_lifecycle_events_reported() {
        let events = Arc::new(Collect::default());
        let config = RuntimeConfig::new().worker_count(1);
        let pool = OffloadPool::start(&config, registry(), events.clone()).unwrap();

        let ok = pool.submit(JobPayload::unary("double", 4i64)).unwrap();
        assert!(ok.wait().is_ok());
        let crashed = pool.submit(JobPayload::new("panic", vec![])).unwrap();
        let job = crashed.id();
        assert!(crashed.wait().unwrap_err().is_worker_lost());
        assert!(wait_for(|| events.names().contains(&"worker.respawned")));
        pool.shutdown().unwrap();

        let names = events.names();
        for name in [
            "job.submitted",
            "job.completed",
            "job.failed",
            "worker.crashed",
            "worker.respawned",
            "pool.shutdown",
        ] {
            assert!(names.contains(&name), "missing {} in {:?}", name, names);
        }
        let recorded = events.0.lock().unwrap();
        assert!(recorded.contains(&Event::WorkerCrashed {
            worker: WorkerId::new(0),
            job: Some(job),
        }));
        assert!(recorded.contains(&Event::WorkerRespawned {
            worker: WorkerId::new(0),
            generation: 1,
        }));
        assert_eq!(recorded.last(), Some(&Event::PoolShutdown { abandoned: 0 }));
    }
}
