//! Error types for the scheduler and the offload pool
//!
//! Local failures stay local: a `SessionError` belongs to one session and a
//! `JobFailure` to one job. Neither changes scheduler or pool control state.

use core::fmt;

use crate::id::{JobId, SessionId, WorkerId};
use crate::job::Arity;
use crate::value::Value;

/// Result type for scheduler and pool operations
pub type OffloadResult<T> = Result<T, OffloadError>;

/// What a job resolves to
pub type JobOutcome = Result<Value, JobFailure>;

/// Errors surfaced by scheduler and pool operations
#[derive(Debug, Clone, PartialEq)]
pub enum OffloadError {
    /// Submission would exceed `job_queue_limit`
    PoolSaturated { limit: usize },

    /// Pool no longer accepts jobs
    PoolShutDown,

    /// In-flight jobs outlived `shutdown_timeout`; they were resolved as cancelled
    ShutdownTimeout { abandoned: usize },

    /// A worker context terminated without a caught error
    WorkerCrash { worker: WorkerId, job: Option<JobId> },

    /// Worker thread could not be spawned
    SpawnFailed(String),

    /// Job kind not present in the registry
    UnknownJobKind(String),

    /// Argument count rejected by the registry
    InvalidArguments {
        kind: String,
        expected: Arity,
        got: usize,
    },

    /// A session tried to submit while its previous job is outstanding
    JobAlreadyPending { session: SessionId, job: JobId },

    /// Session id is unknown or already terminated
    SessionNotFound(SessionId),

    /// Configuration rejected by validation
    InvalidConfig(&'static str),

    /// A session's own failure
    Session(SessionError),

    /// A job's failure
    Job(JobFailure),
}

impl fmt::Display for OffloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffloadError::PoolSaturated { limit } => {
                write!(f, "offload pool saturated ({} jobs queued)", limit)
            }
            OffloadError::PoolShutDown => write!(f, "offload pool is shut down"),
            OffloadError::ShutdownTimeout { abandoned } => {
                write!(f, "shutdown timed out, {} job(s) abandoned", abandoned)
            }
            OffloadError::WorkerCrash { worker, job: Some(job) } => {
                write!(f, "worker {} crashed while running {}", worker, job)
            }
            OffloadError::WorkerCrash { worker, job: None } => {
                write!(f, "worker {} crashed", worker)
            }
            OffloadError::SpawnFailed(msg) => write!(f, "failed to spawn worker: {}", msg),
            OffloadError::UnknownJobKind(kind) => write!(f, "unknown job kind '{}'", kind),
            OffloadError::InvalidArguments {
                kind,
                expected,
                got,
            } => write!(
                f,
                "job '{}' takes {} argument(s), got {}",
                kind, expected, got
            ),
            OffloadError::JobAlreadyPending { session, job } => {
                write!(f, "session {} already waits on {}", session, job)
            }
            OffloadError::SessionNotFound(id) => write!(f, "session {} not found", id),
            OffloadError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            OffloadError::Session(e) => write!(f, "{}", e),
            OffloadError::Job(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for OffloadError {}

impl From<SessionError> for OffloadError {
    fn from(e: SessionError) -> Self {
        OffloadError::Session(e)
    }
}

impl From<JobFailure> for OffloadError {
    fn from(e: JobFailure) -> Self {
        OffloadError::Job(e)
    }
}

/// Category of a session failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    /// The session's logic reported a failure
    Logic,

    /// The step function panicked
    Panicked,

    /// Waiting on something that can never arrive
    Stalled,

    /// Misused the step contract (e.g. awaited with no pending job)
    Protocol,
}

/// Failure of a single session, isolated from every other session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    pub kind: SessionErrorKind,
    pub message: String,
}

impl SessionError {
    pub fn new(kind: SessionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Failure reported by session logic
    pub fn logic(message: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::Logic, message)
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            SessionErrorKind::Logic => "failed",
            SessionErrorKind::Panicked => "panicked",
            SessionErrorKind::Stalled => "stalled",
            SessionErrorKind::Protocol => "protocol error",
        };
        write!(f, "session {}: {}", kind, self.message)
    }
}

impl std::error::Error for SessionError {}

/// Why a job did not produce a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The job function returned an error
    Raised(String),

    /// The worker running the job died; the job may be resubmitted
    WorkerLost { worker: WorkerId },

    /// Cancelled before (or while) running
    Cancelled,
}

/// Failed outcome of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub job: JobId,
    pub cause: FailureCause,
}

impl JobFailure {
    pub fn new(job: JobId, cause: FailureCause) -> Self {
        Self { job, cause }
    }

    pub fn raised(job: JobId, message: impl Into<String>) -> Self {
        Self::new(job, FailureCause::Raised(message.into()))
    }

    pub fn cancelled(job: JobId) -> Self {
        Self::new(job, FailureCause::Cancelled)
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, FailureCause::Cancelled)
    }

    #[inline]
    pub fn is_worker_lost(&self) -> bool {
        matches!(self.cause, FailureCause::WorkerLost { .. })
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            FailureCause::Raised(msg) => write!(f, "job {} failed: {}", self.job, msg),
            FailureCause::WorkerLost { worker } => {
                write!(f, "job {} lost with worker {}", self.job, worker)
            }
            FailureCause::Cancelled => write!(f, "job {} cancelled", self.job),
        }
    }
}

impl std::error::Error for JobFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = OffloadError::PoolSaturated { limit: 8 };
        assert_eq!(format!("{}", e), "offload pool saturated (8 jobs queued)");

        let e = OffloadError::WorkerCrash {
            worker: WorkerId::new(2),
            job: Some(JobId::new(9)),
        };
        assert_eq!(format!("{}", e), "worker w2 crashed while running j9");

        let e = OffloadError::InvalidArguments {
            kind: "spin".into(),
            expected: Arity::Exact(1),
            got: 0,
        };
        assert_eq!(format!("{}", e), "job 'spin' takes exactly 1 argument(s), got 0");
    }

    #[test]
    fn test_job_failure_causes() {
        let lost = JobFailure::new(
            JobId::new(1),
            FailureCause::WorkerLost {
                worker: WorkerId::new(0),
            },
        );
        assert!(lost.is_worker_lost());
        assert!(!lost.is_cancelled());
        assert_eq!(lost.to_string(), "job j1 lost with worker w0");

        let c = JobFailure::cancelled(JobId::new(2));
        assert!(c.is_cancelled());
    }

    #[test]
    fn test_error_conversion() {
        let err: OffloadError = SessionError::logic("boom").into();
        assert!(matches!(err, OffloadError::Session(ref e) if e.kind == SessionErrorKind::Logic));
        assert_eq!(err.to_string(), "session failed: boom");

        let err: OffloadError = JobFailure::raised(JobId::new(3), "bad").into();
        assert_eq!(err.to_string(), "job j3 failed: bad");
    }
}
