//! Linux futex-based parker
//!
//! Futex word semantics:
//! - 0 = no permit
//! - 1 = permit available
//!
//! park: consume a permit if present; otherwise FUTEX_WAIT while the word
//! is 0, then consume whatever permit woke us.
//! unpark: set the word to 1 and FUTEX_WAKE one waiter if someone is parked.

use super::Parker;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

pub struct FutexParker {
    /// Futex word: 0 = empty, 1 = permit
    futex: AtomicU32,

    /// A thread is inside park (skip the syscall when nobody sleeps)
    parked: AtomicBool,
}

impl FutexParker {
    pub fn new() -> Self {
        Self {
            futex: AtomicU32::new(0),
            parked: AtomicBool::new(false),
        }
    }
}

impl Default for FutexParker {
    fn default() -> Self {
        Self::new()
    }
}

impl Parker for FutexParker {
    fn park(&self, timeout: Option<Duration>) -> bool {
        if self.futex.swap(0, Ordering::Acquire) == 1 {
            return true;
        }

        self.parked.store(true, Ordering::SeqCst);

        let timespec = timeout.map(|d| libc::timespec {
            tv_sec: libc::time_t::try_from(d.as_secs()).unwrap_or(libc::time_t::MAX),
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        let timespec_ptr = match &timespec {
            Some(ts) => ts as *const libc::timespec,
            None => std::ptr::null(),
        };

        // Sleeps only while the word is still 0; an unpark racing with us
        // makes this return EAGAIN immediately.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                0u32,
                timespec_ptr,
                std::ptr::null::<u32>(),
                0u32,
            );
        }

        self.parked.store(false, Ordering::SeqCst);

        // Timeout, EINTR and spurious returns all land here; the permit
        // decides whether we were really unparked.
        self.futex.swap(0, Ordering::Acquire) == 1
    }

    fn unpark(&self) {
        if self.futex.swap(1, Ordering::Release) == 1 {
            return; // Permit already pending, waiter (if any) already signalled
        }
        if !self.parked.load(Ordering::SeqCst) {
            return;
        }
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                1i32,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }

    fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Relaxed)
    }
}
