//! # offload-core
//!
//! Core types for the offload scheduler.
//!
//! This crate is platform-agnostic and spawns no threads.
//! Worker threads, parking and the scheduler loop live in `offload-runtime`.
//!
//! ## Modules
//!
//! - `id` - Session, job and worker identifiers
//! - `state` - Session and job lifecycle states
//! - `value` - `Value`, the data that crosses the scheduler/worker boundary
//! - `job` - Job descriptors and the job registry
//! - `handle` - Single-assignment result slot (`JobSlot` / `JobHandle`)
//! - `error` - Error taxonomy
//! - `event` - Lifecycle events and sinks
//! - `traits` - Notification seams between scheduler and pool
//! - `kprint` - Kernel-style leveled logging macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod state;
pub mod value;
pub mod job;
pub mod handle;
pub mod error;
pub mod event;
pub mod traits;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::{JobId, SessionId, WorkerId};
pub use state::{JobState, SessionState};
pub use value::Value;
pub use job::{Arity, JobFn, JobPayload, JobRegistry, JobSpec};
pub use handle::{job_channel, JobHandle, JobSlot};
pub use error::{
    FailureCause, JobFailure, JobOutcome, OffloadError, OffloadResult, SessionError,
    SessionErrorKind,
};
pub use event::{Event, EventSink, LogSink, NullSink};
pub use traits::{CompletionSink, MessageSink};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};
