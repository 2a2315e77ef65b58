//! Cooperative session scheduler
//!
//! Multiplexes any number of sessions onto the calling thread. Design:
//!
//! - Sessions are boxed `Session` state machines in a HashMap; a session
//!   costs its own state plus one small entry
//! - Ready sessions resume in FIFO order (`ReadyQueue`)
//! - Sleeping sessions sit in the timer heap (`TimerQueue`)
//! - Jobs run on the shared `OffloadPool`; the job → session map lives
//!   only here, on the scheduler thread
//! - Completions and handle events arrive on lock-free queues in `Shared`
//!   and are drained between every step
//! - When nothing is ready the thread parks until the next deadline or
//!   an unpark from a worker or handle
//!
//! ```text
//!                 ┌──────────── run() loop ────────────┐
//!   completions ─>│ drain inputs -> pop ready -> step  │
//!   inbound     ─>│      ^                      │      │
//!   timers      ─>│      └──── suspend/exit <───┘      │
//!                 │ idle: park(next deadline)          │
//!                 └────────────────────────────────────┘
//! ```

mod handle;
mod session;

pub use handle::SchedulerHandle;
pub use session::{JobTicket, RunReport, Session, SessionExit, Step, StepContext, Wake};

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use offload_core::{kdebug, ktrace, kwarn};
use offload_core::{
    CompletionSink, Event, EventSink, JobFailure, JobHandle, JobId, JobOutcome, JobPayload,
    LogSink, MessageSink, OffloadError, OffloadResult, SessionError, SessionErrorKind, SessionId,
    SessionState, Value,
};

use crate::config::RuntimeConfig;
use crate::pool::OffloadPool;
use crate::ready_queue::ReadyQueue;
use crate::timer::{TimerKey, TimerQueue};
use handle::{Inbound, Shared};

/// A submitted job not yet handed back to its session
pub(crate) struct PendingJob {
    pub handle: JobHandle,
    /// Outcome that arrived before the session awaited it
    pub stashed: Option<JobOutcome>,
}

/// Borrowed pieces of the scheduler needed to submit a job
pub(crate) struct JobLink<'a> {
    pool: &'a OffloadPool,
    sink: &'a Arc<Shared>,
    waiting: &'a mut HashMap<JobId, SessionId>,
    submitted: &'a mut u64,
}

impl JobLink<'_> {
    pub fn submit(
        &mut self,
        session: SessionId,
        slot: &mut Option<PendingJob>,
        payload: JobPayload,
    ) -> OffloadResult<JobTicket> {
        if let Some(pending) = slot {
            return Err(OffloadError::JobAlreadyPending {
                session,
                job: pending.handle.id(),
            });
        }

        let sink: Arc<dyn CompletionSink> = Arc::clone(self.sink) as Arc<dyn CompletionSink>;
        let handle = self.pool.submit_with_sink(payload, sink)?;
        let job = handle.id();
        self.waiting.insert(job, session);
        *slot = Some(PendingJob {
            handle,
            stashed: None,
        });
        *self.submitted += 1;
        ktrace!("{} submitted {}", session, job);
        Ok(JobTicket::new(job, session))
    }
}

struct SessionEntry {
    /// None only while the session is stepping
    session: Option<Box<dyn Session>>,
    state: SessionState,
    /// Set together with a push onto the ready queue
    wake: Option<Wake>,
    mailbox: VecDeque<Value>,
    timer: Option<TimerKey>,
    job: Option<PendingJob>,
}

impl SessionEntry {
    fn new(session: Box<dyn Session>) -> Self {
        Self {
            session: Some(session),
            state: SessionState::Created,
            wake: None,
            mailbox: VecDeque::new(),
            timer: None,
            job: None,
        }
    }
}

fn make_ready(ready: &mut ReadyQueue, id: SessionId, entry: &mut SessionEntry, wake: Wake) {
    entry.wake = Some(wake);
    entry.state = SessionState::Ready;
    ready.push(id);
}

/// Default outbound message sink
struct LogMessages;

impl MessageSink for LogMessages {
    fn deliver(&mut self, from: SessionId, message: Value) {
        kdebug!("{} sent: {}", from, message);
    }
}

/// Single-threaded cooperative scheduler
///
/// Owned by one thread; sessions need not be `Send`. Use `handle()` to
/// reach it from other threads.
pub struct Scheduler {
    pool: Arc<OffloadPool>,
    shared: Arc<Shared>,
    live_handles: Arc<()>,

    sessions: HashMap<SessionId, SessionEntry>,
    ready: ReadyQueue,
    timers: TimerQueue,
    waiting: HashMap<JobId, SessionId>,

    outbox: Box<dyn MessageSink>,
    events: Arc<dyn EventSink>,

    next_session: u64,
    max_idle_park: Duration,
    expired: Vec<SessionId>,

    // Reset by each run()
    exits: Vec<(SessionId, SessionExit)>,
    steps: u64,
    jobs_submitted: u64,
}

impl Scheduler {
    pub fn new(config: &RuntimeConfig, pool: Arc<OffloadPool>) -> Self {
        Self {
            pool,
            shared: Arc::new(Shared::new()),
            live_handles: Arc::new(()),
            sessions: HashMap::new(),
            ready: ReadyQueue::new(),
            timers: TimerQueue::new(),
            waiting: HashMap::new(),
            outbox: Box::new(LogMessages),
            events: Arc::new(LogSink::new(config.debug_logging)),
            next_session: 0,
            max_idle_park: config.max_idle_park,
            expired: Vec::new(),
            exits: Vec::new(),
            steps: 0,
            jobs_submitted: 0,
        }
    }

    pub fn set_message_sink(&mut self, sink: Box<dyn MessageSink>) {
        self.outbox = sink;
    }

    pub fn set_event_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.events = sink;
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle::new(Arc::clone(&self.shared), Arc::clone(&self.live_handles))
    }

    pub fn pool(&self) -> &Arc<OffloadPool> {
        &self.pool
    }

    /// Sessions registered and not yet exited
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn state_of(&self, session: SessionId) -> Option<SessionState> {
        self.sessions.get(&session).map(|e| e.state)
    }

    /// Add a session; its first step runs with `Wake::Start`
    pub fn register<S: Session + 'static>(&mut self, session: S) -> SessionId {
        self.register_boxed(Box::new(session))
    }

    pub fn register_boxed(&mut self, session: Box<dyn Session>) -> SessionId {
        self.next_session += 1;
        let id = SessionId::new(self.next_session);
        let mut entry = SessionEntry::new(session);
        make_ready(&mut self.ready, id, &mut entry, Wake::Start);
        self.sessions.insert(id, entry);
        self.events.on_event(&Event::SessionRegistered { session: id });
        id
    }

    /// Submit a job on behalf of `session` from outside its step
    pub fn submit_job(
        &mut self,
        session: SessionId,
        payload: JobPayload,
    ) -> OffloadResult<JobTicket> {
        let entry = self
            .sessions
            .get_mut(&session)
            .ok_or(OffloadError::SessionNotFound(session))?;
        let mut link = JobLink {
            pool: &self.pool,
            sink: &self.shared,
            waiting: &mut self.waiting,
            submitted: &mut self.jobs_submitted,
        };
        link.submit(session, &mut entry.job, payload)
    }

    /// Put a message in a session's mailbox
    pub fn deliver(&mut self, session: SessionId, message: impl Into<Value>) -> OffloadResult<()> {
        if !self.sessions.contains_key(&session) {
            return Err(OffloadError::SessionNotFound(session));
        }
        self.push_message(session, message.into());
        Ok(())
    }

    /// Remove a session now, detaching it from any pending job
    pub fn cancel(&mut self, session: SessionId) -> OffloadResult<()> {
        if !self.sessions.contains_key(&session) {
            return Err(OffloadError::SessionNotFound(session));
        }
        self.finish(session, SessionExit::Cancelled);
        Ok(())
    }

    /// Drive every registered session until it exits
    pub fn run(&mut self) -> RunReport {
        let start = Instant::now();
        kdebug!("scheduler run: {} sessions", self.sessions.len());

        loop {
            self.poll_inputs();

            if let Some(id) = self.ready.pop() {
                self.resume(id);
                continue;
            }
            if self.sessions.is_empty() {
                break;
            }
            if self.is_stalled() {
                self.fail_stalled();
                continue;
            }

            let timeout = match self.timers.next_deadline() {
                Some(deadline) => deadline
                    .saturating_duration_since(Instant::now())
                    .min(self.max_idle_park),
                None => self.max_idle_park,
            };
            if !timeout.is_zero() {
                self.shared.parker.park(Some(timeout));
            }
        }

        let report = RunReport {
            exits: std::mem::take(&mut self.exits),
            elapsed: start.elapsed(),
            steps: std::mem::take(&mut self.steps),
            jobs_submitted: std::mem::take(&mut self.jobs_submitted),
        };
        kdebug!(
            "scheduler run done: {} exits, {} steps, {} jobs in {:?}",
            report.exits.len(),
            report.steps,
            report.jobs_submitted,
            report.elapsed
        );
        report
    }

    /// Drain completions and handle events, fire due timers
    fn poll_inputs(&mut self) {
        while let Some(job) = self.shared.completions.pop() {
            self.on_job_resolved(job);
        }

        while let Some(event) = self.shared.inbound.pop() {
            match event {
                Inbound::Deliver(id, message) => {
                    if self.sessions.contains_key(&id) {
                        self.push_message(id, message);
                    } else {
                        kdebug!("dropping message for unknown {}", id);
                    }
                }
                Inbound::Cancel(id) => {
                    if self.sessions.contains_key(&id) {
                        self.finish(id, SessionExit::Cancelled);
                    }
                }
            }
        }

        if !self.timers.is_empty() {
            self.timers.poll_expired(Instant::now(), &mut self.expired);
            for id in self.expired.drain(..) {
                if let Some(entry) = self.sessions.get_mut(&id) {
                    entry.timer = None;
                    make_ready(&mut self.ready, id, entry, Wake::Timer);
                }
            }
        }
    }

    fn on_job_resolved(&mut self, job: JobId) {
        let Some(session) = self.waiting.remove(&job) else {
            return;
        };
        let Some(entry) = self.sessions.get_mut(&session) else {
            ktrace!("discarding result of {} for departed {}", job, session);
            return;
        };
        let Some(pending) = entry.job.as_mut() else {
            return;
        };
        if pending.handle.id() != job {
            return;
        }

        let outcome = pending
            .handle
            .try_take()
            .unwrap_or_else(|| Err(JobFailure::cancelled(job)));

        if entry.state == SessionState::AwaitingJob {
            entry.job = None;
            make_ready(&mut self.ready, session, entry, Wake::Job(outcome));
        } else {
            pending.stashed = Some(outcome);
        }
    }

    fn push_message(&mut self, id: SessionId, message: Value) {
        let Some(entry) = self.sessions.get_mut(&id) else {
            return;
        };
        if entry.state == SessionState::AwaitingMessage {
            make_ready(&mut self.ready, id, entry, Wake::Message(message));
        } else {
            entry.mailbox.push_back(message);
        }
    }

    fn resume(&mut self, id: SessionId) {
        let now = Instant::now();
        let stop_requested = self.shared.stop.load(Ordering::Acquire);

        // Stale ids (cancelled sessions) are skipped
        let Some(entry) = self.sessions.get_mut(&id) else {
            return;
        };
        let Some(wake) = entry.wake.take() else {
            return;
        };
        let Some(mut session) = entry.session.take() else {
            return;
        };
        entry.state = SessionState::Running;
        self.events.on_event(&Event::SessionResumed { session: id });

        let result = {
            let mut cx = StepContext {
                id,
                now,
                link: JobLink {
                    pool: &self.pool,
                    sink: &self.shared,
                    waiting: &mut self.waiting,
                    submitted: &mut self.jobs_submitted,
                },
                job: &mut entry.job,
                outbox: self.outbox.as_mut(),
                stop_requested,
                mailbox_len: entry.mailbox.len(),
            };
            panic::catch_unwind(AssertUnwindSafe(|| session.step(&mut cx, wake)))
        };
        self.steps += 1;

        let exit = match result {
            Ok(Step::Complete(value)) => Some(SessionExit::Completed(value)),
            Ok(Step::Fail(error)) => Some(SessionExit::Failed(error)),
            Ok(step) => self.suspend(id, session, step, now),
            Err(payload) => Some(SessionExit::Failed(SessionError::new(
                SessionErrorKind::Panicked,
                crate::panic_message(payload.as_ref()),
            ))),
        };
        if let Some(exit) = exit {
            self.finish(id, exit);
        }
    }

    /// Park a session according to its step; returns an exit on misuse
    fn suspend(
        &mut self,
        id: SessionId,
        session: Box<dyn Session>,
        step: Step,
        now: Instant,
    ) -> Option<SessionExit> {
        let entry = self.sessions.get_mut(&id)?;
        entry.session = Some(session);

        match step {
            Step::Yield => make_ready(&mut self.ready, id, entry, Wake::Yielded),
            Step::Sleep(delay) => match self.timers.insert_after(id, now, delay) {
                Some(key) => {
                    entry.timer = Some(key);
                    entry.state = SessionState::Sleeping;
                }
                None => {
                    return Some(SessionExit::Failed(SessionError::new(
                        SessionErrorKind::Protocol,
                        format!("sleep of {:?} is out of range", delay),
                    )));
                }
            },
            Step::AwaitJob => {
                let Some(pending) = entry.job.as_mut() else {
                    return Some(SessionExit::Failed(SessionError::new(
                        SessionErrorKind::Protocol,
                        "awaited a job but none is pending",
                    )));
                };
                match pending.stashed.take() {
                    Some(outcome) => {
                        entry.job = None;
                        make_ready(&mut self.ready, id, entry, Wake::Job(outcome));
                    }
                    None => entry.state = SessionState::AwaitingJob,
                }
            }
            Step::Recv => match entry.mailbox.pop_front() {
                Some(message) => make_ready(&mut self.ready, id, entry, Wake::Message(message)),
                None => entry.state = SessionState::AwaitingMessage,
            },
            Step::Complete(value) => return Some(SessionExit::Completed(value)),
            Step::Fail(error) => return Some(SessionExit::Failed(error)),
        }
        None
    }

    /// Remove a session and record how it left
    fn finish(&mut self, id: SessionId, exit: SessionExit) {
        let Some(entry) = self.sessions.remove(&id) else {
            return;
        };

        if let Some(key) = entry.timer {
            self.timers.cancel(key);
        }
        if let Some(pending) = entry.job {
            self.detach_job(pending);
        }

        let event = match &exit {
            SessionExit::Completed(_) => Event::SessionFinished { session: id },
            SessionExit::Failed(error) => Event::SessionFailed {
                session: id,
                error: error.clone(),
            },
            SessionExit::Cancelled => Event::SessionCancelled { session: id },
        };
        self.events.on_event(&event);
        self.exits.push((id, exit));
    }

    /// Let go of a job whose session is gone
    ///
    /// A queued job is cancelled in the pool. A running job keeps its
    /// `waiting` entry so its completion can be recognised and dropped.
    fn detach_job(&mut self, pending: PendingJob) {
        let job = pending.handle.id();
        if pending.stashed.is_none() && self.pool.cancel(job) {
            self.waiting.remove(&job);
        }
    }

    /// Nothing can ever make a remaining session runnable again
    fn is_stalled(&mut self) -> bool {
        self.ready.is_empty()
            && self.timers.next_deadline().is_none()
            && self.waiting.is_empty()
            && self.shared.is_quiet()
            && Arc::strong_count(&self.live_handles) == 1
    }

    fn fail_stalled(&mut self) {
        let mut stalled: Vec<SessionId> = self.sessions.keys().copied().collect();
        stalled.sort();
        kwarn!("{} sessions can never be woken; failing them", stalled.len());
        for id in stalled {
            self.finish(
                id,
                SessionExit::Failed(SessionError::new(
                    SessionErrorKind::Stalled,
                    "waiting for a message that can never arrive",
                )),
            );
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let pending: Vec<PendingJob> = self
            .sessions
            .values_mut()
            .filter_map(|entry| entry.job.take())
            .collect();
        for job in pending {
            self.detach_job(job);
        }
    }
}
