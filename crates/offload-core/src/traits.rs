//! Notification seams between the scheduler, the pool and the outside world
//!
//! The pool never knows which session owns a job and the scheduler never
//! touches worker state. They only meet through these traits.

use crate::id::{JobId, SessionId};
use crate::value::Value;

/// Told when a job's result slot has been written
///
/// Called on whichever thread resolved the job (a worker, the pool monitor,
/// or a thread running shutdown). Must not block.
pub trait CompletionSink: Send + Sync {
    fn job_resolved(&self, job: JobId);
}

/// Receives values a session writes with `StepContext::send`
///
/// Runs on the scheduler thread between steps; must be non-blocking and
/// bounded like any other scheduler-thread code.
pub trait MessageSink {
    fn deliver(&mut self, from: SessionId, message: Value);
}

/// Collects outbound messages in memory
impl MessageSink for Vec<(SessionId, Value)> {
    fn deliver(&mut self, from: SessionId, message: Value) {
        self.push((from, message));
    }
}
