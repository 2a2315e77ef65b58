//! Cross-thread entry points into a running scheduler
//!
//! Everything that reaches the scheduler from another thread goes through
//! `Shared`: job completions from pool workers, and message deliveries or
//! cancellations from `SchedulerHandle`s. Both are lock-free queues drained
//! on the scheduler thread between steps; each push unparks the scheduler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;

use offload_core::{CompletionSink, JobId, SessionId, Value};

use crate::parking::{new_parker, Parker};

pub(crate) enum Inbound {
    Deliver(SessionId, Value),
    Cancel(SessionId),
}

pub(crate) struct Shared {
    pub inbound: SegQueue<Inbound>,
    pub completions: SegQueue<JobId>,
    pub parker: Box<dyn Parker>,
    pub stop: AtomicBool,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            inbound: SegQueue::new(),
            completions: SegQueue::new(),
            parker: new_parker(),
            stop: AtomicBool::new(false),
        }
    }

    /// Nothing waiting to be drained
    pub fn is_quiet(&self) -> bool {
        self.inbound.is_empty() && self.completions.is_empty()
    }
}

impl CompletionSink for Shared {
    fn job_resolved(&self, job: JobId) {
        self.completions.push(job);
        self.parker.unpark();
    }
}

/// Thread-safe handle to a scheduler
///
/// Clone it into other threads to feed sessions while `run()` is going.
/// While any clone is alive the scheduler assumes more input may arrive,
/// so sessions blocked in `Step::Recv` are not reported as stalled.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
    _live: Arc<()>,
}

impl SchedulerHandle {
    pub(crate) fn new(shared: Arc<Shared>, live: Arc<()>) -> Self {
        Self {
            shared,
            _live: live,
        }
    }

    /// Put a message in a session's mailbox (an input becoming ready)
    pub fn deliver(&self, session: SessionId, message: impl Into<Value>) {
        self.shared
            .inbound
            .push(Inbound::Deliver(session, message.into()));
        self.shared.parker.unpark();
    }

    /// Remove a session; a queued job it owns is cancelled in the pool
    pub fn cancel(&self, session: SessionId) {
        self.shared.inbound.push(Inbound::Cancel(session));
        self.shared.parker.unpark();
    }

    /// Ask sessions to wind down; observed through
    /// `StepContext::cancel_requested`
    pub fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.parker.unpark();
    }
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("queued_inbound", &self.shared.inbound.len())
            .finish()
    }
}
