//! Thread parking for the scheduler loop
//!
//! The scheduler thread parks when no session is runnable, until the next
//! timer deadline or until a job completion / inbound event unparks it.
//!
//! Semantics follow a single permit, like `std::thread::park`: an `unpark`
//! that arrives before `park` is remembered, so a notification sent between
//! "queue looked empty" and "went to sleep" is never lost.

use std::time::Duration;

/// Platform-specific parking primitive for one waiting thread
pub trait Parker: Send + Sync {
    /// Block until unparked or `timeout` elapses
    ///
    /// Returns:
    /// - `true` if a permit was consumed (unparked)
    /// - `false` on timeout or spurious wakeup
    ///
    /// Callers re-check their queues after returning regardless.
    fn park(&self, timeout: Option<Duration>) -> bool;

    /// Make a permit available and wake the parked thread, if any
    ///
    /// Multiple unparks before a park collapse into one permit.
    fn unpark(&self);

    /// True while a thread is inside `park` (hint, may be stale)
    fn is_parked(&self) -> bool;
}

// Platform-specific implementations
cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParker as PlatformParker;
    } else {
        mod fallback;
        pub use fallback::CondvarParker as PlatformParker;
    }
}

/// Create a new platform-appropriate parker
pub fn new_parker() -> Box<dyn Parker> {
    Box::new(PlatformParker::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_park_timeout() {
        let parker = new_parker();
        let start = Instant::now();
        let woken = parker.park(Some(Duration::from_millis(50)));
        let elapsed = start.elapsed();

        assert!(!woken);
        assert!(elapsed >= Duration::from_millis(40));
    }

    #[test]
    fn test_unpark_before_park_is_remembered() {
        let parker = new_parker();
        parker.unpark();
        parker.unpark();

        let start = Instant::now();
        assert!(parker.park(Some(Duration::from_secs(5))));
        assert!(start.elapsed() < Duration::from_secs(1));

        // Permits do not accumulate
        assert!(!parker.park(Some(Duration::from_millis(20))));
    }

    #[test]
    fn test_unpark_wakes_parked_thread() {
        let parker = Arc::new(PlatformParker::new());
        let parker2 = Arc::clone(&parker);

        let handle = thread::spawn(move || {
            let start = Instant::now();
            parker2.park(Some(Duration::from_secs(10)));
            start.elapsed()
        });

        thread::sleep(Duration::from_millis(50));
        parker.unpark();

        let waited = handle.join().unwrap();
        assert!(waited < Duration::from_secs(5));
    }
}
