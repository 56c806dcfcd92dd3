use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::pause::PauseGate;

/// Errors that can occur when constructing a clock.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    #[error("tick period must be non-zero")]
    ZeroPeriod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClockState {
    Stopped,
    Running,
    Closed,
}

struct ClockShared {
    state: Mutex<ClockState>,
    wake: Condvar,
}

impl ClockShared {
    fn set_state(&self, from: Option<ClockState>, to: ClockState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if from.is_none_or(|from| *state == from) {
            *state = to;
            self.wake.notify_all();
        }
    }
}

/// Fires a callback at a fixed cadence while running and not paused.
/// Independent of the per-snake loops; meant for consumers that need a
/// uniform heartbeat, such as a display refresh.
pub struct TickClock {
    shared: Arc<ClockShared>,
    worker: Option<JoinHandle<()>>,
}

impl TickClock {
    pub fn new(
        period: Duration,
        gate: Arc<PauseGate>,
        tick: impl Fn() + Send + 'static,
    ) -> Result<Self, ClockError> {
        if period.is_zero() {
            return Err(ClockError::ZeroPeriod);
        }
        let shared = Arc::new(ClockShared {
            state: Mutex::new(ClockState::Stopped),
            wake: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("tick-clock".into())
            .spawn(move || Self::run(worker_shared, period, gate, tick))
            .expect("spawning the clock thread");
        Ok(TickClock {
            shared,
            worker: Some(worker),
        })
    }

    fn run(shared: Arc<ClockShared>, period: Duration, gate: Arc<PauseGate>, tick: impl Fn()) {
        let mut state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match *state {
                ClockState::Closed => return,
                ClockState::Stopped => {
                    state = shared
                        .wake
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                ClockState::Running => {
                    let (guard, timeout) = shared
                        .wake
                        .wait_timeout(state, period)
                        .unwrap_or_else(PoisonError::into_inner);
                    state = guard;
                    // An early wake means the state changed; re-check it
                    // before firing.
                    if timeout.timed_out()
                        && *state == ClockState::Running
                        && !gate.is_paused()
                    {
                        drop(state);
                        tick();
                        state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
                    }
                }
            }
        }
    }

    /// Begins firing. A second `start` while already running is a no-op.
    pub fn start(&self) {
        self.shared
            .set_state(Some(ClockState::Stopped), ClockState::Running);
    }

    /// Stops future firings; a callback already dispatched finishes
    /// normally. The clock can be started again afterwards.
    pub fn stop(&self) {
        self.shared
            .set_state(Some(ClockState::Running), ClockState::Stopped);
    }

    /// Unconditionally cancels pending and future firings and releases
    /// the worker thread.
    pub fn close(&mut self) {
        self.shared.set_state(None, ClockState::Closed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for TickClock {
    fn drop(&mut self) {
        self.close();
    }
}
