//! Runtime configuration
//!
//! Library defaults with environment overrides, then builder methods.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables (`from_env`)
//! 3. Library defaults (`defaults` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use offload_runtime::config::{RuntimeConfig, ShutdownMode};
//!
//! let config = RuntimeConfig::from_env()
//!     .worker_count(4)
//!     .job_queue_limit(Some(1024))
//!     .shutdown_mode(ShutdownMode::Cancel);
//! ```

pub mod defaults;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use offload_core::env::{env_get, env_get_bool, env_get_millis, env_get_opt};
use offload_core::kprintln;
use offload_core::{OffloadError, OffloadResult};

/// What `shutdown()` does with jobs that have not started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownMode {
    /// Run every queued job, then stop
    #[default]
    Drain,
    /// Resolve queued jobs as cancelled; wait only for running ones
    Cancel,
}

impl FromStr for ShutdownMode {
    type Err = OffloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "drain" => Ok(ShutdownMode::Drain),
            "cancel" => Ok(ShutdownMode::Cancel),
            _ => Err(OffloadError::InvalidConfig(
                "shutdown_mode must be 'drain' or 'cancel'",
            )),
        }
    }
}

impl fmt::Display for ShutdownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownMode::Drain => f.write_str("drain"),
            ShutdownMode::Cancel => f.write_str("cancel"),
        }
    }
}

/// Configuration shared by the offload pool and the scheduler
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Number of worker threads in the pool
    pub worker_count: usize,
    /// Cap on jobs waiting for a worker; `None` = unbounded
    pub job_queue_limit: Option<usize>,
    /// Max wait for in-flight jobs on shutdown
    pub shutdown_timeout: Duration,
    /// Drain or cancel queued jobs on shutdown
    pub shutdown_mode: ShutdownMode,
    /// Upper bound on one idle park of the scheduler thread
    pub max_idle_park: Duration,
    /// Log every lifecycle event at debug level
    pub debug_logging: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `OFL_WORKER_COUNT` - Worker threads
    /// - `OFL_JOB_QUEUE_LIMIT` - Queued-job cap (0 = unbounded)
    /// - `OFL_SHUTDOWN_TIMEOUT_MS` - Shutdown wait in milliseconds
    /// - `OFL_SHUTDOWN_MODE` - `drain` or `cancel`
    /// - `OFL_MAX_IDLE_PARK_MS` - Longest scheduler park in milliseconds
    /// - `OFL_DEBUG` - Verbose lifecycle logging (0/1)
    pub fn from_env() -> Self {
        let limit: usize = env_get("OFL_JOB_QUEUE_LIMIT", defaults::JOB_QUEUE_LIMIT);
        Self {
            worker_count: env_get("OFL_WORKER_COUNT", defaults::worker_count()),
            job_queue_limit: (limit > 0).then_some(limit),
            shutdown_timeout: env_get_millis(
                "OFL_SHUTDOWN_TIMEOUT_MS",
                Duration::from_millis(defaults::SHUTDOWN_TIMEOUT_MS),
            ),
            shutdown_mode: env_get_opt("OFL_SHUTDOWN_MODE").unwrap_or_default(),
            max_idle_park: env_get_millis(
                "OFL_MAX_IDLE_PARK_MS",
                Duration::from_millis(defaults::MAX_IDLE_PARK_MS),
            ),
            debug_logging: env_get_bool("OFL_DEBUG", defaults::DEBUG_LOGGING),
        }
    }

    /// Library defaults only, no environment lookup.
    /// Useful for tests that must not depend on the caller's shell.
    pub fn new() -> Self {
        Self {
            worker_count: defaults::worker_count(),
            job_queue_limit: None,
            shutdown_timeout: Duration::from_millis(defaults::SHUTDOWN_TIMEOUT_MS),
            shutdown_mode: ShutdownMode::Drain,
            max_idle_park: Duration::from_millis(defaults::MAX_IDLE_PARK_MS),
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }

    // Builder methods

    pub fn worker_count(mut self, n: usize) -> Self {
        self.worker_count = n;
        self
    }

    pub fn job_queue_limit(mut self, limit: Option<usize>) -> Self {
        self.job_queue_limit = limit;
        self
    }

    pub fn shutdown_timeout(mut self, d: Duration) -> Self {
        self.shutdown_timeout = d;
        self
    }

    pub fn shutdown_mode(mut self, mode: ShutdownMode) -> Self {
        self.shutdown_mode = mode;
        self
    }

    pub fn max_idle_park(mut self, d: Duration) -> Self {
        self.max_idle_park = d;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    pub fn validate(&self) -> OffloadResult<()> {
        if self.worker_count == 0 {
            return Err(OffloadError::InvalidConfig("worker_count must be > 0"));
        }
        if self.worker_count > defaults::MAX_WORKERS {
            return Err(OffloadError::InvalidConfig("worker_count must be <= 256"));
        }
        if self.job_queue_limit == Some(0) {
            return Err(OffloadError::InvalidConfig(
                "job_queue_limit must be > 0 (use None for unbounded)",
            ));
        }
        if self.max_idle_park.is_zero() {
            return Err(OffloadError::InvalidConfig("max_idle_park must be > 0"));
        }
        Ok(())
    }

    /// Print configuration (for demos)
    pub fn print(&self) {
        kprintln!("Offload configuration:");
        kprintln!("  worker_count:      {}", self.worker_count);
        match self.job_queue_limit {
            Some(n) => kprintln!("  job_queue_limit:   {}", n),
            None => kprintln!("  job_queue_limit:   unbounded"),
        }
        kprintln!("  shutdown_timeout:  {:?}", self.shutdown_timeout);
        kprintln!("  shutdown_mode:     {}", self.shutdown_mode);
        kprintln!("  max_idle_park:     {:?}", self.max_idle_park);
        kprintln!("  debug_logging:     {}", self.debug_logging);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = RuntimeConfig::new();
        assert!(config.worker_count >= 1);
        assert_eq!(config.job_queue_limit, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = RuntimeConfig::new()
            .worker_count(8)
            .job_queue_limit(Some(16))
            .shutdown_timeout(Duration::from_millis(250))
            .shutdown_mode(ShutdownMode::Cancel);

        assert_eq!(config.worker_count, 8);
        assert_eq!(config.job_queue_limit, Some(16));
        assert_eq!(config.shutdown_timeout, Duration::from_millis(250));
        assert_eq!(config.shutdown_mode, ShutdownMode::Cancel);
    }

    #[test]
    fn test_validation() {
        assert!(RuntimeConfig::new().worker_count(0).validate().is_err());
        assert!(RuntimeConfig::new().worker_count(1000).validate().is_err());
        assert!(RuntimeConfig::new().job_queue_limit(Some(0)).validate().is_err());
        assert!(RuntimeConfig::new()
            .max_idle_park(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_shutdown_mode_parse() {
        assert_eq!("Cancel".parse::<ShutdownMode>(), Ok(ShutdownMode::Cancel));
        assert_eq!("drain".parse::<ShutdownMode>(), Ok(ShutdownMode::Drain));
        assert!("kill".parse::<ShutdownMode>().is_err());
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("OFL_JOB_QUEUE_LIMIT", "32");
        std::env::set_var("OFL_SHUTDOWN_MODE", "cancel");
        let config = RuntimeConfig::from_env();
        std::env::remove_var("OFL_JOB_QUEUE_LIMIT");
        std::env::remove_var("OFL_SHUTDOWN_MODE");

        assert_eq!(config.job_queue_limit, Some(32));
        assert_eq!(config.shutdown_mode, ShutdownMode::Cancel);
    }
}
