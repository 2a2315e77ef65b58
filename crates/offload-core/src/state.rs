//! Session and job lifecycle states

use core::fmt;

/// State of a session inside the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Registered, first step not yet run
    Created = 0,

    /// In the ready queue
    Ready = 1,

    /// Currently executing its step on the scheduler thread
    Running = 2,

    /// Suspended on a timer
    Sleeping = 3,

    /// Suspended on a submitted job
    AwaitingJob = 4,

    /// Suspended on its mailbox
    AwaitingMessage = 5,

    /// Completed with a value
    Finished = 6,

    /// Step failed or panicked
    Failed = 7,

    /// Cancelled by its owner
    Cancelled = 8,
}

impl SessionState {
    #[inline]
    pub const fn is_runnable(&self) -> bool {
        matches!(self, SessionState::Created | SessionState::Ready)
    }

    /// Suspended at one of the three suspension points
    #[inline]
    pub const fn is_suspended(&self) -> bool {
        matches!(
            self,
            SessionState::Sleeping | SessionState::AwaitingJob | SessionState::AwaitingMessage
        )
    }

    #[inline]
    pub const fn is_terminated(&self) -> bool {
        matches!(
            self,
            SessionState::Finished | SessionState::Failed | SessionState::Cancelled
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Created => "created",
            SessionState::Ready => "ready",
            SessionState::Running => "running",
            SessionState::Sleeping => "sleeping",
            SessionState::AwaitingJob => "awaiting-job",
            SessionState::AwaitingMessage => "awaiting-message",
            SessionState::Finished => "finished",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// State of a job inside the pool
///
/// Stored in an `AtomicU8` by the result slot, hence the explicit
/// discriminants and `From<u8>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobState {
    /// Queued, no worker has claimed it
    Submitted = 0,

    /// Claimed by a worker
    Running = 1,

    /// Resolved with a value
    Completed = 2,

    /// Resolved with a failure (raised or worker lost)
    Failed = 3,

    /// Resolved as cancelled, possibly without ever running
    Cancelled = 4,
}

impl JobState {
    #[inline]
    pub const fn is_resolved(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

impl From<u8> for JobState {
    fn from(v: u8) -> Self {
        match v {
            0 => JobState::Submitted,
            1 => JobState::Running,
            2 => JobState::Completed,
            3 => JobState::Failed,
            _ => JobState::Cancelled,
        }
    }
}

impl From<JobState> for u8 {
    fn from(state: JobState) -> u8 {
        state as u8
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Submitted => "submitted",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_classes() {
        assert!(SessionState::Created.is_runnable());
        assert!(SessionState::Ready.is_runnable());
        assert!(!SessionState::Sleeping.is_runnable());

        assert!(SessionState::AwaitingJob.is_suspended());
        assert!(SessionState::AwaitingMessage.is_suspended());
        assert!(!SessionState::Running.is_suspended());

        assert!(SessionState::Cancelled.is_terminated());
        assert!(!SessionState::AwaitingJob.is_terminated());
    }

    #[test]
    fn test_job_state_u8_roundtrip() {
        for state in [
            JobState::Submitted,
            JobState::Running,
            JobState::Completed,
            JobState::Failed,
            JobState::Cancelled,
        ] {
            assert_eq!(JobState::from(u8::from(state)), state);
        }
        assert!(!JobState::Running.is_resolved());
        assert!(JobState::Cancelled.is_resolved());
    }
}
