use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{Direction, Position, SnakeId};

/// Mutable state of one snake: the occupied cells (head first), the current
/// heading, and the capacity the body may grow to.
struct SnakeState {
    body: VecDeque<Position>,
    direction: Direction,
    capacity: usize,
}

/// One independently-controlled occupant of the grid.
///
/// The state sits behind a single reader-writer lock: collision scans and
/// display layers read concurrently, while only the owning control loop
/// writes. Readers never observe a body mid-append.
pub struct Snake {
    id: SnakeId,
    state: RwLock<SnakeState>,
}

impl Snake {
    pub fn new(id: SnakeId, start: Position, direction: Direction, capacity: usize) -> Self {
        let mut body = VecDeque::with_capacity(capacity);
        body.push_front(start);
        Snake {
            id,
            state: RwLock::new(SnakeState {
                body,
                direction,
                capacity,
            }),
        }
    }

    pub fn id(&self) -> SnakeId {
        self.id
    }

    pub fn head(&self) -> Position {
        *self.read().body.front().expect("snake body is never empty")
    }

    pub fn direction(&self) -> Direction {
        self.read().direction
    }

    /// Independent copy of the occupied cells, head first.
    pub fn body_snapshot(&self) -> Vec<Position> {
        self.read().body.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.read().body.len()
    }

    pub fn capacity(&self) -> usize {
        self.read().capacity
    }

    /// Updates the heading. An exact 180° reversal is silently dropped;
    /// racing turn requests are benign since heading is advisory steering.
    pub fn turn(&self, direction: Direction) {
        let mut state = self.write();
        if state.direction.is_reverse_of(direction) {
            return;
        }
        state.direction = direction;
    }

    /// Commits a move: appends `new_head`, grows capacity when `grow` is
    /// set, then trims the tail until length fits the capacity again.
    pub fn advance(&self, new_head: Position, grow: bool) {
        let mut state = self.write();
        state.body.push_front(new_head);
        if grow {
            state.capacity += 1;
        }
        while state.body.len() > state.capacity {
            state.body.pop_back();
        }
    }

    // A runner that panicked mid-step must not wedge every other snake's
    // collision scan, so poisoned locks are recovered rather than unwound.
    fn read(&self) -> RwLockReadGuard<'_, SnakeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SnakeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snake() -> Snake {
        Snake::new(0, Position { x: 5, y: 5 }, Direction::Right, 3)
    }

    #[test]
    fn advance_never_exceeds_capacity() {
        let s = snake();
        for i in 0..6 {
            s.advance(Position { x: 6 + i, y: 5 }, false);
            assert!(s.len() <= s.capacity());
        }
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn advance_with_growth_raises_capacity() {
        let s = snake();
        s.advance(Position { x: 6, y: 5 }, true);
        assert_eq!(s.capacity(), 4);
        assert_eq!(s.len(), 2);
        assert_eq!(s.head(), Position { x: 6, y: 5 });
    }

    #[test]
    fn snapshot_is_head_first() {
        let s = snake();
        s.advance(Position { x: 6, y: 5 }, false);
        s.advance(Position { x: 7, y: 5 }, false);
        assert_eq!(
            s.body_snapshot(),
            vec![
                Position { x: 7, y: 5 },
                Position { x: 6, y: 5 },
                Position { x: 5, y: 5 },
            ]
        );
    }

    #[test]
    fn reverse_turn_is_dropped() {
        let s = snake();
        s.turn(Direction::Left);
        assert_eq!(s.direction(), Direction::Right);
        s.turn(Direction::Up);
        assert_eq!(s.direction(), Direction::Up);
        s.turn(Direction::Down);
        assert_eq!(s.direction(), Direction::Up);
    }
}
