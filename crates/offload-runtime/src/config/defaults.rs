//! Library defaults for `RuntimeConfig`
//!
//! Environment variables override these at `RuntimeConfig::from_env()`.

/// Fallback worker count when the CPU count cannot be read
pub const FALLBACK_WORKER_COUNT: usize = 4;

/// Upper bound on workers in one pool
pub const MAX_WORKERS: usize = 256;

/// Queued-job cap; 0 means unbounded
pub const JOB_QUEUE_LIMIT: usize = 0;

pub const SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

/// Longest single park of an idle scheduler thread
pub const MAX_IDLE_PARK_MS: u64 = 100;

pub const DEBUG_LOGGING: bool = false;

/// One worker per available CPU
pub fn worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_WORKER_COUNT)
        .min(MAX_WORKERS)
}
