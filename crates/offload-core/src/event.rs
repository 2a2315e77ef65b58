//! Lifecycle events
//!
//! The scheduler and the pool report what happens to sessions, jobs and
//! workers as `Event`s. Logging, metrics or test probes subscribe by
//! implementing `EventSink`; the core only guarantees the events are
//! emitted, never what is done with them.
//!
//! Sinks are called inline (from the scheduler thread for session events,
//! from worker or monitor threads for pool events) and must be cheap.

use crate::error::{FailureCause, SessionError};
use crate::id::{JobId, SessionId, WorkerId};
use crate::{kdebug, kinfo, ktrace, kwarn};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SessionRegistered { session: SessionId },
    SessionResumed { session: SessionId },
    SessionFinished { session: SessionId },
    SessionFailed { session: SessionId, error: SessionError },
    SessionCancelled { session: SessionId },
    JobSubmitted { job: JobId, kind: String },
    JobCompleted { job: JobId, worker: WorkerId },
    JobFailed { job: JobId, cause: FailureCause },
    JobCancelled { job: JobId },
    WorkerCrashed { worker: WorkerId, job: Option<JobId> },
    WorkerRespawned { worker: WorkerId, generation: u32 },
    PoolShutdown { abandoned: usize },
}

impl Event {
    /// Stable short name, handy for counting
    pub fn name(&self) -> &'static str {
        match self {
            Event::SessionRegistered { .. } => "session.registered",
            Event::SessionResumed { .. } => "session.resumed",
            Event::SessionFinished { .. } => "session.finished",
            Event::SessionFailed { .. } => "session.failed",
            Event::SessionCancelled { .. } => "session.cancelled",
            Event::JobSubmitted { .. } => "job.submitted",
            Event::JobCompleted { .. } => "job.completed",
            Event::JobFailed { .. } => "job.failed",
            Event::JobCancelled { .. } => "job.cancelled",
            Event::WorkerCrashed { .. } => "worker.crashed",
            Event::WorkerRespawned { .. } => "worker.respawned",
            Event::PoolShutdown { .. } => "pool.shutdown",
        }
    }
}

pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn on_event(&self, _event: &Event) {}
}

/// Forwards events to the kprint macros
///
/// Crashes and session failures are warnings. Everything else is debug
/// when `verbose`, trace otherwise; `SessionResumed` is always trace since
/// it fires once per step.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink {
    pub verbose: bool,
}

impl LogSink {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn detail(&self, args: std::fmt::Arguments<'_>) {
        if self.verbose {
            kdebug!("{}", args);
        } else {
            ktrace!("{}", args);
        }
    }
}

impl EventSink for LogSink {
    fn on_event(&self, event: &Event) {
        match event {
            Event::SessionResumed { session } => ktrace!("session {} resumed", session),
            Event::SessionRegistered { session } => {
                self.detail(format_args!("session {} registered", session))
            }
            Event::SessionFinished { session } => {
                self.detail(format_args!("session {} finished", session))
            }
            Event::SessionFailed { session, error } => {
                kwarn!("session {} removed: {}", session, error)
            }
            Event::SessionCancelled { session } => {
                self.detail(format_args!("session {} cancelled", session))
            }
            Event::JobSubmitted { job, kind } => {
                self.detail(format_args!("job {} ({}) submitted", job, kind))
            }
            Event::JobCompleted { job, worker } => {
                self.detail(format_args!("job {} completed on {}", job, worker))
            }
            Event::JobFailed { job, cause } => {
                self.detail(format_args!("job {} failed: {:?}", job, cause))
            }
            Event::JobCancelled { job } => self.detail(format_args!("job {} cancelled", job)),
            Event::WorkerCrashed { worker, job } => match job {
                Some(job) => kwarn!("worker {} crashed while running {}", worker, job),
                None => kwarn!("worker {} crashed", worker),
            },
            Event::WorkerRespawned { worker, generation } => {
                kinfo!("worker {} respawned (generation {})", worker, generation)
            }
            Event::PoolShutdown { abandoned: 0 } => self.detail(format_args!("pool shut down")),
            Event::PoolShutdown { abandoned } => {
                kwarn!("pool shut down, {} job(s) abandoned", abandoned)
            }
        }
    }
}
