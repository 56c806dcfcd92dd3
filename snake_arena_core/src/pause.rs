use std::sync::{Condvar, Mutex, PoisonError};

use crate::runner::CancelToken;

/// Process-wide run/pause flag with broadcast wake. Every control loop
/// consults the gate before each step; `resume` releases all waiters at
/// once and is a no-op when nothing is paused.
#[derive(Default)]
pub struct PauseGate {
    paused: Mutex<bool>,
    wake: Condvar,
}

impl PauseGate {
    pub fn new() -> Self {
        PauseGate::default()
    }

    pub fn pause(&self) {
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    pub fn resume(&self) {
        let mut paused = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        *paused = false;
        self.wake.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks while the gate is paused, re-checking the flag after every
    /// wakeup. Returns `false` as soon as `cancel` fires, whether the
    /// caller was parked or not.
    pub fn wait_while_paused(&self, cancel: &CancelToken) -> bool {
        let mut paused = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            if !*paused {
                return true;
            }
            paused = self
                .wake
                .wait(paused)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Wakes every waiter without changing the pause flag, so a parked
    /// loop re-checks its cancellation token. The notification is
    /// published under the gate mutex; a waiter between its token check
    /// and its wait still holds the mutex, so the wakeup cannot be lost.
    pub fn interrupt(&self) {
        let _paused = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        self.wake.notify_all();
    }
}
