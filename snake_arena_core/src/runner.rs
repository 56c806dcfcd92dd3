use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info};

use crate::Direction;
use crate::arena::{Arena, DeathCause, MoveResult};
use crate::pause::PauseGate;
use crate::snake::Snake;

const BASE_SLEEP: Duration = Duration::from_millis(80);
const BOOST_SLEEP: Duration = Duration::from_millis(40);
const BOOST_WINDOW_TICKS: u32 = 100;
const TURN_CHANCE: f64 = 0.10;
const TURN_CHANCE_BOOSTED: f64 = 0.05;

struct CancelInner {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Cooperative cancellation signal, observed at every suspension point of
/// a control loop: the pause wait and the per-iteration sleep.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken {
            inner: Arc::new(CancelInner {
                cancelled: Mutex::new(false),
                wake: Condvar::new(),
            }),
        }
    }

    pub fn cancel(&self) {
        let mut cancelled = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for up to `duration`. Returns `false` when the token was
    /// cancelled before the interval elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut cancelled = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if *cancelled {
                return false;
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return true;
            };
            let (guard, _timeout) = self
                .inner
                .wake
                .wait_timeout(cancelled, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            cancelled = guard;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        CancelToken::new()
    }
}

/// Drives one snake: wait on the pause gate, steer, step, react to the
/// outcome, sleep. Runs until death or external cancellation.
pub struct SnakeRunner {
    snake: Arc<Snake>,
    arena: Arc<Arena>,
    gate: Arc<PauseGate>,
    token: CancelToken,
    boost_ticks: u32,
}

impl SnakeRunner {
    /// Spawns the control loop on its own thread and returns a handle for
    /// stopping and joining it.
    pub fn spawn(snake: Arc<Snake>, arena: Arc<Arena>, gate: Arc<PauseGate>) -> RunnerHandle {
        let token = CancelToken::new();
        let runner = SnakeRunner {
            snake,
            arena,
            gate: Arc::clone(&gate),
            token: token.clone(),
            boost_ticks: 0,
        };
        let thread = thread::Builder::new()
            .name(format!("snake-{}", runner.snake.id()))
            .spawn(move || runner.run())
            .expect("spawning a runner thread");
        RunnerHandle { token, gate, thread }
    }

    fn run(mut self) {
        debug!(snake = self.snake.id(), "runner started");
        loop {
            if !self.gate.wait_while_paused(&self.token) {
                break;
            }
            self.maybe_turn();
            match self.arena.transition(&self.snake) {
                MoveResult::HitObstacle => self.random_turn(),
                MoveResult::AteBoost => self.boost_ticks = BOOST_WINDOW_TICKS,
                MoveResult::DeadByOther => {
                    self.die(DeathCause::OtherSnake);
                    return;
                }
                MoveResult::DeadBySelf => {
                    self.die(DeathCause::OwnBody);
                    return;
                }
                MoveResult::Moved | MoveResult::AteFood | MoveResult::Teleported => {}
            }
            let interval = if self.boost_ticks > 0 {
                self.boost_ticks -= 1;
                BOOST_SLEEP
            } else {
                BASE_SLEEP
            };
            if !self.token.sleep(interval) {
                break;
            }
        }
        debug!(snake = self.snake.id(), "runner cancelled");
    }

    fn die(&self, cause: DeathCause) {
        self.arena.record_death(&self.snake, cause);
        info!(snake = self.snake.id(), ?cause, "snake died");
    }

    fn maybe_turn(&mut self) {
        let chance = if self.boost_ticks > 0 {
            TURN_CHANCE_BOOSTED
        } else {
            TURN_CHANCE
        };
        if rand::rng().random_bool(chance) {
            self.random_turn();
        }
    }

    fn random_turn(&self) {
        let mut rng = rand::rng();
        let direction = Direction::ALL[rng.random_range(0..Direction::ALL.len())];
        self.snake.turn(direction);
    }
}

/// Stop/join handle for a spawned control loop.
pub struct RunnerHandle {
    token: CancelToken,
    gate: Arc<PauseGate>,
    thread: JoinHandle<()>,
}

impl RunnerHandle {
    /// Requests termination; the loop observes it at its next suspension
    /// point, including a wait on a paused gate.
    pub fn stop(&self) {
        self.token.cancel();
        self.gate.interrupt();
    }

    /// Waits for the loop to exit. A runner that panicked stays contained
    /// to its own thread.
    pub fn join(self) {
        let _ = self.thread.join();
    }
}
