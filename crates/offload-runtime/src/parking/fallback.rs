//! Condvar-based parker
//!
//! Used on platforms without futex support.

use super::Parker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

pub struct CondvarParker {
    /// true = permit available
    permit: Mutex<bool>,
    condvar: Condvar,
    parked: AtomicBool,
}

impl CondvarParker {
    pub fn new() -> Self {
        Self {
            permit: Mutex::new(false),
            condvar: Condvar::new(),
            parked: AtomicBool::new(false),
        }
    }
}

impl Default for CondvarParker {
    fn default() -> Self {
        Self::new()
    }
}

impl Parker for CondvarParker {
    fn park(&self, timeout: Option<Duration>) -> bool {
        let mut permit = self.permit.lock().unwrap_or_else(PoisonError::into_inner);
        if *permit {
            *permit = false;
            return true;
        }

        self.parked.store(true, Ordering::SeqCst);
        permit = match timeout {
            Some(t) => {
                self.condvar
                    .wait_timeout(permit, t)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => self
                .condvar
                .wait(permit)
                .unwrap_or_else(PoisonError::into_inner),
        };
        self.parked.store(false, Ordering::SeqCst);

        std::mem::replace(&mut *permit, false)
    }

    fn unpark(&self) {
        {
            let mut permit = self.permit.lock().unwrap_or_else(PoisonError::into_inner);
            *permit = true;
        }
        self.condvar.notify_one();
    }

    fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Relaxed)
    }
}
