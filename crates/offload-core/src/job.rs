//! Job descriptors and the registry that validates them
//!
//! A job is described by a `JobPayload`: a kind tag naming a registered
//! function plus its arguments. Submission looks the kind up in a
//! `JobRegistry` and checks the argument count before anything is queued,
//! so a malformed job is rejected on the caller's thread instead of failing
//! later on a worker.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{OffloadError, OffloadResult};
use crate::value::Value;

/// A job function: pure computation over owned arguments
///
/// `Err(message)` resolves the job as a raised failure. A panic is treated
/// as a worker crash by the pool.
pub type JobFn = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// Accepted argument count for a job kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    #[inline]
    pub fn accepts(&self, n: usize) -> bool {
        match *self {
            Arity::Exact(k) => n == k,
            Arity::AtLeast(k) => n >= k,
            Arity::Any => true,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(k) => write!(f, "exactly {}", k),
            Arity::AtLeast(k) => write!(f, "at least {}", k),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Immutable description of work to perform
#[derive(Debug, Clone, PartialEq)]
pub struct JobPayload {
    pub kind: String,
    pub args: Vec<Value>,
}

impl JobPayload {
    pub fn new(kind: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            kind: kind.into(),
            args,
        }
    }

    /// Payload with a single argument
    pub fn unary(kind: impl Into<String>, arg: impl Into<Value>) -> Self {
        Self::new(kind, vec![arg.into()])
    }
}

/// A registered job kind
#[derive(Clone)]
pub struct JobSpec {
    pub arity: Arity,
    pub function: JobFn,
}

impl fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSpec").field("arity", &self.arity).finish()
    }
}

/// Table of job kinds a pool is willing to run
#[derive(Clone, Default)]
pub struct JobRegistry {
    specs: HashMap<String, JobSpec>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a job kind
    pub fn register<F>(&mut self, kind: impl Into<String>, arity: Arity, f: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.specs.insert(
            kind.into(),
            JobSpec {
                arity,
                function: Arc::new(f),
            },
        );
        self
    }

    /// Check a payload and return the function that will run it
    pub fn validate(&self, payload: &JobPayload) -> OffloadResult<JobFn> {
        let spec = self
            .specs
            .get(&payload.kind)
            .ok_or_else(|| OffloadError::UnknownJobKind(payload.kind.clone()))?;

        if !spec.arity.accepts(payload.args.len()) {
            return Err(OffloadError::InvalidArguments {
                kind: payload.kind.clone(),
                expected: spec.arity,
                got: payload.args.len(),
            });
        }

        Ok(Arc::clone(&spec.function))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.specs.contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.specs.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
