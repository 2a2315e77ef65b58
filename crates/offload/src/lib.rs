//! # offload - Cooperative Scheduler with Offload Pool
//!
//! One thread juggles many lightweight sessions; CPU-heavy or blocking
//! work is handed to a fixed pool of worker threads so no session can
//! freeze the others.
//!
//! ## Features
//!
//! - **Sessions**: explicit step state machines, thousands per thread
//! - **Timers and mailboxes**: sleep and simulated I/O without threads
//! - **Offload pool**: pre-warmed workers, FIFO queue, optional backpressure
//! - **Crash recovery**: a panicking job loses its worker, the pool respawns it
//! - **Shutdown**: drain or cancel, bounded by a timeout
//!
//! ## Quick Start
//!
//! ```ignore
//! use offload::{jobs, Runtime, RuntimeConfig, Step, StepContext, Value, Wake};
//!
//! fn main() {
//!     let runtime = Runtime::new(RuntimeConfig::from_env()).unwrap();
//!     let report = runtime.block_on(|sched| {
//!         sched.register(|cx: &mut StepContext<'_>, wake: Wake| match wake {
//!             Wake::Start => {
//!                 cx.submit_job(jobs::sum_squares_job(10_000_000)).unwrap();
//!                 Step::AwaitJob
//!             }
//!             Wake::Job(Ok(v)) => Step::Complete(v),
//!             _ => Step::Complete(Value::Unit),
//!         });
//!         sched.run()
//!     });
//!     println!("{:?}", report.exits);
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Sessions                          │
//! │        Session::step(cx, wake) -> Step                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Scheduler (one thread)                      │
//! │     ready queue, timer heap, mailboxes, job → session map   │
//! └─────────────────────────────────────────────────────────────┘
//!                 │ submit                   ▲ completion ids
//!                 ▼                          │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Offload Pool                            │
//! │    job queue ──> worker threads ──> result slots            │
//! │                  monitor thread respawns crashed workers    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

// Re-export core types
pub use offload_core::{
    job_channel, Arity, CompletionSink, Event, EventSink, FailureCause, JobFailure, JobFn,
    JobHandle, JobId, JobOutcome, JobPayload, JobRegistry, JobSlot, JobState, LogSink,
    MessageSink, NullSink, OffloadError, OffloadResult, SessionError, SessionErrorKind,
    SessionId, SessionState, Value, WorkerId,
};

// Re-export kprint macros for logging
pub use offload_core::{kdebug, kerror, kinfo, kprintln, ktrace, kwarn};
pub use offload_core::kprint::{
    init as init_logging, set_flush_enabled, set_log_level, set_time_enabled, LogLevel,
};

// Re-export env utilities
pub use offload_core::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};

// Re-export runtime types
pub use offload_runtime::jobs;
pub use offload_runtime::{
    builtin_registry, register_builtins, JobTicket, OffloadPool, PoolStats, RunReport,
    RuntimeConfig, Scheduler, SchedulerHandle, Session, SessionExit, ShutdownMode, Step,
    StepContext, Wake,
};

/// Owns one offload pool and hands out schedulers bound to it
///
/// Dropping the runtime shuts the pool down.
pub struct Runtime {
    config: RuntimeConfig,
    pool: Arc<OffloadPool>,
    events: Arc<dyn EventSink>,
}

impl Runtime {
    /// Start a pool with the built-in job kinds
    pub fn new(config: RuntimeConfig) -> OffloadResult<Self> {
        Self::with_registry(config, builtin_registry())
    }

    /// Start a pool with a caller-supplied registry
    pub fn with_registry(config: RuntimeConfig, registry: JobRegistry) -> OffloadResult<Self> {
        let events: Arc<dyn EventSink> = Arc::new(LogSink::new(config.debug_logging));
        Self::with_events(config, registry, events)
    }

    /// Start a pool reporting lifecycle events to `events`
    ///
    /// Schedulers created by this runtime report to the same sink.
    pub fn with_events(
        config: RuntimeConfig,
        registry: JobRegistry,
        events: Arc<dyn EventSink>,
    ) -> OffloadResult<Self> {
        let pool = OffloadPool::start(&config, registry, Arc::clone(&events))?;
        kdebug!("runtime up: {} workers", config.worker_count);
        Ok(Self {
            config,
            pool,
            events,
        })
    }

    /// A fresh scheduler sharing this runtime's pool
    pub fn scheduler(&self) -> Scheduler {
        let mut sched = Scheduler::new(&self.config, Arc::clone(&self.pool));
        sched.set_event_sink(Arc::clone(&self.events));
        sched
    }

    /// Build a scheduler, hand it to `f`, return what `f` returns
    pub fn block_on<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut Scheduler) -> T,
    {
        let mut sched = self.scheduler();
        f(&mut sched)
    }

    pub fn pool(&self) -> &Arc<OffloadPool> {
        &self.pool
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Shut the pool down now; later calls are no-ops
    pub fn shutdown(&self) -> OffloadResult<()> {
        self.pool.shutdown()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if let Err(e) = self.pool.shutdown() {
            kwarn!("runtime shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    fn config(workers: usize) -> RuntimeConfig {
        RuntimeConfig::new().worker_count(workers)
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

    /// Session that offloads one job and completes with its outcome
    fn offloader(payload: JobPayload) -> impl Session {
        let mut payload = Some(payload);
        move |cx: &mut StepContext<'_>, wake: Wake| match wake {
            Wake::Start => match payload.take().map(|p| cx.submit_job(p)) {
                Some(Ok(_)) => Step::AwaitJob,
                Some(Err(e)) => Step::Fail(SessionError::logic(e.to_string())),
                None => Step::Fail(SessionError::logic("started twice")),
            },
            Wake::Job(Ok(v)) => Step::Complete(v),
            Wake::Job(Err(f)) => Step::Fail(SessionError::logic(f.to_string())),
            other => Step::Fail(SessionError::logic(format!("unexpected {:?}", other))),
        }
    }

    #[test]
    fn test_three_delays_run_concurrently() {
        let runtime = Runtime::new(config(1)).unwrap();
        let mut sched = runtime.scheduler();
        let ids: Vec<SessionId> = [300u64, 100, 200]
            .into_iter()
            .map(|ms| {
                sched.register(move |_cx: &mut StepContext<'_>, wake: Wake| match wake {
                    Wake::Start => Step::Sleep(Duration::from_millis(ms)),
                    _ => Step::Complete(Value::UInt(ms)),
                })
            })
            .collect();

        let report = sched.run();
        assert_eq!(report.completion_order(), vec![ids[1], ids[2], ids[0]]);
        assert!(report.elapsed >= Duration::from_millis(300));
        assert!(report.elapsed < Duration::from_millis(550), "{:?}", report.elapsed);
    }

    #[test]
    fn test_four_jobs_on_four_workers_in_parallel() {
        let runtime = Runtime::new(config(4)).unwrap();
        let mut sched = runtime.scheduler();
        for _ in 0..4 {
            sched.register(offloader(jobs::spin_job(250)));
        }

        let report = sched.run();
        assert!(report.all_completed(), "{:?}", report.exits);
        assert_eq!(runtime.stats().peak_busy, 4);
        // Serial would be ~1s
        assert!(report.elapsed < Duration::from_millis(750), "{:?}", report.elapsed);
    }

    #[test]
    fn test_submit_returns_before_job_finishes() {
        let runtime = Runtime::new(config(1)).unwrap();
        let mut sched = runtime.scheduler();
        let submitted_in = Arc::new(Mutex::new(Duration::ZERO));
        let record = Arc::clone(&submitted_in);
        sched.register(move |cx: &mut StepContext<'_>, wake: Wake| match wake {
            Wake::Start => {
                let t = Instant::now();
                let ok = cx.submit_job(jobs::sleep_job(200)).is_ok();
                *record.lock().unwrap() = t.elapsed();
                if ok {
                    Step::AwaitJob
                } else {
                    Step::Fail(SessionError::logic("submit failed"))
                }
            }
            _ => Step::Complete(Value::Unit),
        });

        let report = sched.run();
        assert!(report.all_completed());
        assert!(*submitted_in.lock().unwrap() < Duration::from_millis(50));
        assert!(report.elapsed >= Duration::from_millis(200));
    }

    #[test]
    fn test_offloaded_work_does_not_starve_sessions() {
        let runtime = Runtime::new(config(1)).unwrap();
        let mut sched = runtime.scheduler();
        let heavy = sched.register(offloader(jobs::spin_job(300)));

        let mut ticks = 0;
        let light = sched.register(move |_cx: &mut StepContext<'_>, _wake: Wake| {
            ticks += 1;
            if ticks > 5 {
                Step::Complete(Value::Int(ticks))
            } else {
                Step::Sleep(Duration::from_millis(10))
            }
        });

        let report = sched.run();
        assert_eq!(report.completion_order(), vec![light, heavy]);
    }

    #[test]
    fn test_excess_jobs_queue_at_most_w_running() {
        let runtime = Runtime::new(config(2)).unwrap();
        let pool = runtime.pool();
        let handles: Vec<JobHandle> = (0..5)
            .map(|_| pool.submit(jobs::sleep_job(150)).unwrap())
            .collect();

        assert!(wait_for(|| {
            let s = pool.stats();
            s.busy == 2 && s.queued == 3
        }));
        for h in handles {
            assert_eq!(h.wait(), Ok(Value::Unit));
        }
        assert_eq!(pool.stats().peak_busy, 2);
    }

    #[test]
    fn test_crash_respawn_restores_parallelism() {
        let mut registry = builtin_registry();
        registry.register("crash", Arity::Any, |_| panic!("worker blew up"));
        let runtime = Runtime::with_registry(config(3), registry).unwrap();

        let mut sched = runtime.scheduler();
        let crashed = sched.register(offloader(JobPayload::new("crash", vec![])));
        let report = sched.run();
        let error = report.exit_of(crashed).and_then(SessionExit::error).unwrap();
        assert!(error.message.contains("lost"), "{}", error.message);

        assert!(wait_for(|| runtime.stats().respawned == 1));
        runtime.pool().reset_peak();

        let mut sched = runtime.scheduler();
        for _ in 0..3 {
            sched.register(offloader(jobs::sleep_job(150)));
        }
        let report = sched.run();
        assert!(report.all_completed());
        assert_eq!(runtime.stats().peak_busy, 3);
    }

    #[test]
    fn test_resubmit_after_failure_is_independent() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);
        let mut registry = JobRegistry::new();
        registry.register("flaky", Arity::Exact(1), move |args| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("first attempt fails".to_string())
            } else {
                Ok(args[0].clone())
            }
        });
        let runtime = Runtime::with_registry(config(1), registry).unwrap();

        let mut sched = runtime.scheduler();
        let id = sched.register(|cx: &mut StepContext<'_>, wake: Wake| {
            let retry = matches!(wake, Wake::Start | Wake::Job(Err(_)));
            match wake {
                Wake::Job(Ok(v)) => Step::Complete(v),
                _ if retry => match cx.submit_job(JobPayload::unary("flaky", 7i64)) {
                    Ok(_) => Step::AwaitJob,
                    Err(e) => Step::Fail(SessionError::logic(e.to_string())),
                },
                _ => Step::Fail(SessionError::logic("unexpected wake")),
            }
        });

        let report = sched.run();
        assert_eq!(report.exit_of(id), Some(&SessionExit::Completed(Value::Int(7))));
        assert_eq!(report.jobs_submitted, 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_queue_limit_rejects_synchronously() {
        let runtime = Runtime::new(config(1).job_queue_limit(Some(1))).unwrap();
        let mut sched = runtime.scheduler();
        let hog = sched.register(offloader(jobs::sleep_job(150)));
        let second = sched.register(offloader(jobs::sleep_job(1)));
        let third = sched.register(offloader(jobs::sleep_job(1)));

        let report = sched.run();
        assert!(report.exit_of(hog).map_or(false, SessionExit::is_completed));
        let exits = [report.exit_of(second), report.exit_of(third)];
        let saturated = exits
            .iter()
            .filter(|e| {
                e.and_then(|e| e.error())
                    .map_or(false, |err| err.message.contains("saturated"))
            })
            .count();
        // One running plus one queued at most; the hog holds its worker
        assert!(saturated >= 1);
    }

    #[test]
    fn test_runtime_shutdown_is_idempotent() {
        let runtime = Runtime::new(config(2)).unwrap();
        let handle = runtime.pool().submit(jobs::sum_squares_job(1_000)).unwrap();
        runtime.shutdown().unwrap();
        assert_eq!(handle.wait(), Ok(Value::UInt(332_833_500)));
        assert!(runtime.shutdown().is_ok());
        assert_eq!(
            runtime.pool().submit(jobs::sleep_job(1)).unwrap_err(),
            OffloadError::PoolShutDown
        );
    }
}
