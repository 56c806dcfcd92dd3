use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::snake::Snake;
use crate::{Position, SnakeId};

const INITIAL_FOOD: usize = 6;
const INITIAL_OBSTACLES: usize = 4;
const INITIAL_BOOSTS: usize = 3;
const TELEPORT_PAIRS: usize = 2;
const BOOST_REGEN_CHANCE: f64 = 0.2;

/// Errors that can occur when constructing an arena.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
    #[error("arena dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
}

/// Outcome of advancing one snake by a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveResult {
    Moved,
    AteFood,
    AteBoost,
    Teleported,
    HitObstacle,
    DeadByOther,
    DeadBySelf,
}

impl MoveResult {
    pub fn is_fatal(self) -> bool {
        matches!(self, MoveResult::DeadByOther | MoveResult::DeadBySelf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeathCause {
    OtherSnake,
    OwnBody,
}

/// One entry of the append-only death ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathRecord {
    pub snake: SnakeId,
    /// Body length at the time of death.
    pub length: usize,
    /// Monotonic death order, starting at 0.
    pub rank: u64,
    pub cause: DeathCause,
    /// Index the snake held in the live list when it was removed.
    pub slot: usize,
}

/// Best-effort combined view of the arena. The live set and the ledger are
/// read independently, so this is observability data, not a transactional
/// snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaStats {
    pub live: usize,
    pub dead: usize,
    pub collision_deaths: usize,
    pub longest_live: Option<(SnakeId, usize)>,
    pub first_dead: Option<SnakeId>,
}

/// The four regenerating item pools, guarded together by one lock so the
/// consume-and-regenerate sequence for food stays a single atomic unit.
struct ItemPools {
    food: HashSet<Position>,
    obstacles: HashSet<Position>,
    boosts: HashSet<Position>,
    teleports: HashMap<Position, Position>,
}

impl ItemPools {
    fn empty() -> Self {
        ItemPools {
            food: HashSet::new(),
            obstacles: HashSet::new(),
            boosts: HashSet::new(),
            teleports: HashMap::new(),
        }
    }

    fn occupied(&self, cell: Position) -> bool {
        self.food.contains(&cell)
            || self.obstacles.contains(&cell)
            || self.boosts.contains(&cell)
            || self.teleports.contains_key(&cell)
    }

    /// Uniform draw of a cell outside every pool. Retries are bounded by
    /// the grid area; on exhaustion the fixed origin cell is returned and
    /// the occasional overlap accepted.
    fn random_free_cell(&self, width: usize, height: usize) -> Position {
        let mut rng = rand::rng();
        for _ in 0..width * height * 2 {
            let cell = Position {
                x: rng.random_range(0..width),
                y: rng.random_range(0..height),
            };
            if !self.occupied(cell) {
                return cell;
            }
        }
        Position { x: 0, y: 0 }
    }
}

/// Shared world state: grid dimensions, the live snakes, the death ledger,
/// and the regenerating item pools. `transition` is the single
/// synchronization point between the per-snake control loops.
pub struct Arena {
    width: usize,
    height: usize,
    snakes: RwLock<Vec<Arc<Snake>>>,
    items: Mutex<ItemPools>,
    deaths: Mutex<Vec<DeathRecord>>,
}

impl Arena {
    pub fn new(width: usize, height: usize) -> Result<Self, ArenaError> {
        if width == 0 || height == 0 {
            return Err(ArenaError::InvalidDimensions { width, height });
        }
        let mut pools = ItemPools::empty();
        for _ in 0..INITIAL_FOOD {
            let cell = pools.random_free_cell(width, height);
            pools.food.insert(cell);
        }
        for _ in 0..INITIAL_OBSTACLES {
            let cell = pools.random_free_cell(width, height);
            pools.obstacles.insert(cell);
        }
        for _ in 0..INITIAL_BOOSTS {
            let cell = pools.random_free_cell(width, height);
            pools.boosts.insert(cell);
        }
        for _ in 0..TELEPORT_PAIRS {
            let a = pools.random_free_cell(width, height);
            // Register the entry cell before drawing the exit so the two
            // ends of a pair cannot land on the same cell.
            pools.teleports.insert(a, a);
            let b = pools.random_free_cell(width, height);
            pools.teleports.insert(a, b);
            pools.teleports.insert(b, a);
        }
        Ok(Arena {
            width,
            height,
            snakes: RwLock::new(Vec::new()),
            items: Mutex::new(pools),
            deaths: Mutex::new(Vec::new()),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Adds a snake to the live set.
    pub fn register(&self, snake: Arc<Snake>) {
        self.snakes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(snake);
    }

    /// Independent copy of the live set; safe to iterate while other
    /// snakes are registered or removed.
    pub fn snakes(&self) -> Vec<Arc<Snake>> {
        self.snakes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn food(&self) -> HashSet<Position> {
        self.lock_items().food.clone()
    }

    pub fn obstacles(&self) -> HashSet<Position> {
        self.lock_items().obstacles.clone()
    }

    pub fn boosts(&self) -> HashSet<Position> {
        self.lock_items().boosts.clone()
    }

    pub fn teleports(&self) -> HashMap<Position, Position> {
        self.lock_items().teleports.clone()
    }

    /// Independent copy of the death ledger, in death order.
    pub fn death_ledger(&self) -> Vec<DeathRecord> {
        self.deaths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Advances `snake` by one cell and resolves every interaction:
    /// collision, hazard, consumption, teleport.
    ///
    /// The collision pre-check reads one snake's body snapshot at a time
    /// and is deliberately not atomic across the whole scan: two snakes
    /// may pass it in the same instant and only surface the conflict on a
    /// later step. The grid is a soft-state simulation, not a
    /// transactional one.
    pub fn transition(&self, snake: &Snake) -> MoveResult {
        let head = snake.head();
        let direction = snake.direction();
        let mut next = head.step(direction, self.width, self.height);

        for other in self.snakes() {
            let own = other.id() == snake.id();
            let body = other.body_snapshot();
            for (i, cell) in body.iter().enumerate() {
                if own && i == 0 {
                    continue;
                }
                if *cell == next {
                    return if own {
                        MoveResult::DeadBySelf
                    } else {
                        MoveResult::DeadByOther
                    };
                }
            }
        }

        let mut teleported = false;
        let ate_food;
        let ate_boost;
        {
            let mut items = self.lock_items();
            if items.obstacles.contains(&next) {
                return MoveResult::HitObstacle;
            }
            if let Some(&exit) = items.teleports.get(&next) {
                next = exit;
                teleported = true;
            }
            ate_food = items.food.remove(&next);
            ate_boost = items.boosts.remove(&next);
            if ate_food {
                let cell = items.random_free_cell(self.width, self.height);
                items.food.insert(cell);
                let cell = items.random_free_cell(self.width, self.height);
                items.obstacles.insert(cell);
                if rand::rng().random_bool(BOOST_REGEN_CHANCE) {
                    let cell = items.random_free_cell(self.width, self.height);
                    items.boosts.insert(cell);
                }
            }
        }

        // The body commit happens outside the item lock.
        snake.advance(next, ate_food);

        if ate_boost {
            MoveResult::AteBoost
        } else if ate_food {
            MoveResult::AteFood
        } else if teleported {
            MoveResult::Teleported
        } else {
            MoveResult::Moved
        }
    }

    /// Moves a snake from the live set into the death ledger, exactly
    /// once. Safe to call concurrently from many runners: removal decides
    /// the winner, and ranks are assigned under the ledger lock.
    pub fn record_death(&self, snake: &Snake, cause: DeathCause) {
        let slot = {
            let mut live = self.snakes.write().unwrap_or_else(PoisonError::into_inner);
            match live.iter().position(|s| s.id() == snake.id()) {
                Some(slot) => {
                    live.remove(slot);
                    slot
                }
                None => return,
            }
        };
        let mut deaths = self.deaths.lock().unwrap_or_else(PoisonError::into_inner);
        let rank = deaths.len() as u64;
        deaths.push(DeathRecord {
            snake: snake.id(),
            length: snake.len(),
            rank,
            cause,
            slot,
        });
    }

    /// Best-effort stats, assembled from independent reads of the live
    /// set and the ledger.
    pub fn stats(&self) -> ArenaStats {
        let snakes = self.snakes();
        let longest_live = snakes
            .iter()
            .map(|s| (s.id(), s.len()))
            .max_by_key(|&(_, len)| len);
        let deaths = self.deaths.lock().unwrap_or_else(PoisonError::into_inner);
        ArenaStats {
            live: snakes.len(),
            dead: deaths.len(),
            collision_deaths: deaths
                .iter()
                .filter(|d| d.cause == DeathCause::OtherSnake)
                .count(),
            longest_live,
            first_dead: deaths.first().map(|d| d.snake),
        }
    }

    fn lock_items(&self) -> std::sync::MutexGuard<'_, ItemPools> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
