//! Identifier types
//!
//! Sessions, jobs and workers are referred to by small copyable ids.
//! Session ids are never reused within one scheduler; job ids are unique
//! within one pool.

use core::fmt;

/// Unique identifier for a session registered with a scheduler
///
/// The maximum value (u64::MAX) is reserved as a sentinel for "no session".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Sentinel value indicating no session
    pub const NONE: SessionId = SessionId(u64::MAX);

    #[inline]
    pub const fn new(id: u64) -> Self {
        SessionId(id)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u64::MAX
    }

    /// Convert to Option, mapping the sentinel to `None`
    #[inline]
    pub const fn to_option(self) -> Option<SessionId> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

impl From<u64> for SessionId {
    #[inline]
    fn from(id: u64) -> Self {
        SessionId(id)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "SessionId(NONE)")
        } else {
            write!(f, "SessionId({})", self.0)
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "s-none")
        } else {
            write!(f, "s{}", self.0)
        }
    }
}

impl Default for SessionId {
    fn default() -> Self {
        SessionId::NONE
    }
}

/// Unique identifier for a job submitted to a pool
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct JobId(u64);

impl JobId {
    #[inline]
    pub const fn new(id: u64) -> Self {
        JobId(id)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "j{}", self.0)
    }
}

/// Index of a worker inside a pool
///
/// A respawned worker keeps the id of the worker it replaces.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct WorkerId(u16);

impl WorkerId {
    #[inline]
    pub const fn new(id: u16) -> Self {
        WorkerId(id)
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_basics() {
        let id = SessionId::new(42);
        assert_eq!(id.as_u64(), 42);
        assert!(!id.is_none());
        assert_eq!(id.to_option(), Some(id));
        assert_eq!(format!("{}", id), "s42");
    }

    #[test]
    fn test_session_id_none() {
        let none = SessionId::default();
        assert!(none.is_none());
        assert_eq!(none.to_option(), None);
        assert_eq!(format!("{:?}", none), "SessionId(NONE)");
    }

    #[test]
    fn test_job_and_worker_display() {
        assert_eq!(JobId::new(7).to_string(), "j7");
        assert_eq!(WorkerId::new(3).to_string(), "w3");
        assert_eq!(WorkerId::new(3).as_usize(), 3);
    }
}
