//! # offload-runtime
//!
//! Thread-backed pieces of the offload scheduler.
//!
//! This crate provides:
//! - Runtime configuration with environment overrides
//! - Thread parking (futex on Linux, condvar elsewhere)
//! - The offload pool: fixed worker threads, job queue, crash respawn
//! - The cooperative session scheduler with its timer heap and ready queue
//! - Built-in job kinds

pub mod config;
pub mod parking;
pub mod timer;
pub mod ready_queue;
pub mod pool;
pub mod scheduler;
pub mod jobs;

// Re-exports
pub use config::{RuntimeConfig, ShutdownMode};
pub use parking::{new_parker, Parker};
pub use pool::{OffloadPool, PoolStats};
pub use scheduler::{
    JobTicket, RunReport, Scheduler, SchedulerHandle, Session, SessionExit, Step, StepContext,
    Wake,
};
pub use jobs::{builtin_registry, register_builtins};

/// Text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
