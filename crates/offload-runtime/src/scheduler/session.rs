//! Session step contract
//!
//! A session is a state machine the scheduler drives one step at a time.
//! Each call to `step` receives the reason the session was resumed (`Wake`)
//! and returns how it wants to suspend (`Step`). Between steps the session
//! holds no thread; all that remains is its boxed state.
//!
//! ```text
//!            register
//!               │
//!               v   Wake::Start
//!   ┌───────> Ready ────────> Running ──Step::Complete/Fail──> (exit)
//!   │                            │
//!   │  Wake::Yielded   <── Step::Yield
//!   │  Wake::Timer     <── Step::Sleep(d)
//!   │  Wake::Job(..)   <── Step::AwaitJob
//!   └─ Wake::Message(..) <─ Step::Recv
//! ```

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use offload_core::{
    JobId, JobOutcome, JobPayload, MessageSink, OffloadResult, SessionError, SessionId, Value,
};

use super::JobLink;

/// Why a session is being resumed
#[derive(Debug)]
pub enum Wake {
    /// First step after registration
    Start,
    /// The session yielded and its turn came round again
    Yielded,
    /// A `Step::Sleep` elapsed
    Timer,
    /// The job the session awaited resolved
    Job(JobOutcome),
    /// A message arrived while the session waited in `Step::Recv`
    Message(Value),
}

/// How a session suspends (or ends) after a step
#[derive(Debug)]
pub enum Step {
    /// Stay runnable; go to the back of the ready queue
    Yield,
    /// Suspend until the duration has elapsed
    Sleep(Duration),
    /// Suspend until the job submitted through `StepContext::submit_job`
    /// resolves
    AwaitJob,
    /// Suspend until the mailbox holds a message
    Recv,
    Complete(Value),
    Fail(SessionError),
}

/// A cooperatively scheduled unit of work
///
/// `step` must return promptly. CPU-bound or blocking work belongs in a job.
pub trait Session {
    fn step(&mut self, cx: &mut StepContext<'_>, wake: Wake) -> Step;
}

impl<F> Session for F
where
    F: FnMut(&mut StepContext<'_>, Wake) -> Step,
{
    fn step(&mut self, cx: &mut StepContext<'_>, wake: Wake) -> Step {
        self(cx, wake)
    }
}

/// Receipt for a job submitted on behalf of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTicket {
    job: JobId,
    session: SessionId,
}

impl JobTicket {
    pub(crate) fn new(job: JobId, session: SessionId) -> Self {
        Self { job, session }
    }

    pub fn job(&self) -> JobId {
        self.job
    }

    pub fn session(&self) -> SessionId {
        self.session
    }
}

/// What a session can reach while it runs a step
pub struct StepContext<'a> {
    pub(crate) id: SessionId,
    pub(crate) now: Instant,
    pub(crate) link: JobLink<'a>,
    pub(crate) job: &'a mut Option<super::PendingJob>,
    pub(crate) outbox: &'a mut dyn MessageSink,
    pub(crate) stop_requested: bool,
    pub(crate) mailbox_len: usize,
}

impl StepContext<'_> {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Time the current step started
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Hand a job to the offload pool; never blocks
    ///
    /// Follow with `Step::AwaitJob` to receive the outcome. Fails with
    /// `JobAlreadyPending` while an earlier job has not been awaited.
    pub fn submit_job(&mut self, payload: JobPayload) -> OffloadResult<JobTicket> {
        self.link.submit(self.id, self.job, payload)
    }

    /// The job submitted but not yet awaited, if any
    pub fn pending_job(&self) -> Option<JobId> {
        self.job.as_ref().map(|p| p.handle.id())
    }

    /// Non-blocking write to the scheduler's message sink
    pub fn send(&mut self, message: impl Into<Value>) {
        self.outbox.deliver(self.id, message.into());
    }

    /// Messages already waiting in this session's mailbox
    pub fn pending_messages(&self) -> usize {
        self.mailbox_len
    }

    /// True once `SchedulerHandle::request_stop` has been called
    pub fn cancel_requested(&self) -> bool {
        self.stop_requested
    }
}

/// How a session left the scheduler
#[derive(Debug, Clone, PartialEq)]
pub enum SessionExit {
    Completed(Value),
    Failed(SessionError),
    Cancelled,
}

impl SessionExit {
    pub fn is_completed(&self) -> bool {
        matches!(self, SessionExit::Completed(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            SessionExit::Completed(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&SessionError> {
        match self {
            SessionExit::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for SessionExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionExit::Completed(v) => write!(f, "completed: {}", v),
            SessionExit::Failed(e) => write!(f, "{}", e),
            SessionExit::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Result of `Scheduler::run`
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Every session that left during the run, in termination order
    pub exits: Vec<(SessionId, SessionExit)>,
    pub elapsed: Duration,
    /// Session steps executed
    pub steps: u64,
    pub jobs_submitted: u64,
}

impl RunReport {
    pub fn exit_of(&self, session: SessionId) -> Option<&SessionExit> {
        self.exits
            .iter()
            .find(|(id, _)| *id == session)
            .map(|(_, exit)| exit)
    }

    /// Ids of sessions that completed, in completion order
    pub fn completion_order(&self) -> Vec<SessionId> {
        self.exits
            .iter()
            .filter(|(_, exit)| exit.is_completed())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn all_completed(&self) -> bool {
        self.exits.iter().all(|(_, exit)| exit.is_completed())
    }

    pub fn count_failed(&self) -> usize {
        self.exits
            .iter()
            .filter(|(_, exit)| matches!(exit, SessionExit::Failed(_)))
            .count()
    }

    pub fn values(&self) -> HashMap<SessionId, &Value> {
        self.exits
            .iter()
            .filter_map(|(id, exit)| exit.value().map(|v| (*id, v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offload_core::SessionErrorKind;

    #[test]
    fn test_report_queries() {
        let a = SessionId::new(1);
        let b = SessionId::new(2);
        let c = SessionId::new(3);
        let report = RunReport {
            exits: vec![
                (b, SessionExit::Completed(Value::Int(2))),
                (c, SessionExit::Failed(SessionError::new(SessionErrorKind::Logic, "x"))),
                (a, SessionExit::Completed(Value::Int(1))),
            ],
            ..Default::default()
        };

        assert_eq!(report.completion_order(), vec![b, a]);
        assert_eq!(report.count_failed(), 1);
        assert!(!report.all_completed());
        assert_eq!(report.exit_of(a), Some(&SessionExit::Completed(Value::Int(1))));
        assert_eq!(report.values().get(&b), Some(&&Value::Int(2)));
    }

    #[test]
    fn test_exit_display() {
        assert_eq!(SessionExit::Cancelled.to_string(), "cancelled");
        assert_eq!(
            SessionExit::Completed(Value::Int(3)).to_string(),
            "completed: 3"
        );
    }
}
