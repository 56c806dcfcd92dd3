use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use snake_arena_core::arena::{Arena, DeathCause};
use snake_arena_core::pause::PauseGate;
use snake_arena_core::runner::SnakeRunner;
use snake_arena_core::snake::Snake;
use snake_arena_core::{Direction, Position, SnakeId};

fn live_heads(arena: &Arena) -> HashMap<SnakeId, Position> {
    arena.snakes().iter().map(|s| (s.id(), s.head())).collect()
}

/// Full stack: arena, gate, and one runner per snake. Pausing freezes
/// every head, resuming unfreezes them, and shutdown is clean.
#[test]
fn pause_freezes_the_whole_simulation() {
    let arena = Arc::new(Arena::new(40, 30).expect("valid dimensions"));
    let gate = Arc::new(PauseGate::new());

    let starts = [
        Position { x: 5, y: 5 },
        Position { x: 30, y: 8 },
        Position { x: 12, y: 20 },
        Position { x: 25, y: 25 },
    ];
    let mut handles = Vec::new();
    for (id, start) in starts.into_iter().enumerate() {
        let snake = Arc::new(Snake::new(id, start, Direction::Right, 5));
        arena.register(Arc::clone(&snake));
        handles.push(SnakeRunner::spawn(
            snake,
            Arc::clone(&arena),
            Arc::clone(&gate),
        ));
    }

    // Let the loops run a little, then pause and wait for in-flight
    // iterations to park on the gate.
    thread::sleep(Duration::from_millis(200));
    gate.pause();
    thread::sleep(Duration::from_millis(250));

    let frozen = live_heads(&arena);
    thread::sleep(Duration::from_millis(200));
    assert_eq!(live_heads(&arena), frozen, "paused snakes must not move");

    gate.resume();
    thread::sleep(Duration::from_millis(300));
    let resumed = live_heads(&arena);
    assert!(
        resumed != frozen || arena.stats().live == 0,
        "resumed snakes must move again"
    );

    for handle in &handles {
        handle.stop();
    }
    for handle in handles {
        handle.join();
    }
}

/// Many threads hammer `transition` on one shared arena with no sleeps.
/// Afterwards the pools must be intact and the ledger gapless.
#[test]
fn stress_transitions_keep_pools_and_ledger_sane() {
    const THREADS: usize = 8;
    const STEPS: usize = 1_500;

    let arena = Arc::new(Arena::new(48, 48).expect("valid dimensions"));
    let mut snakes = Vec::new();
    for id in 0..THREADS {
        // One snake per row, all heading right: plenty of traffic through
        // the item pools without scripted collisions.
        let snake = Arc::new(Snake::new(
            id,
            Position { x: 0, y: id * 6 },
            Direction::Right,
            5,
        ));
        arena.register(Arc::clone(&snake));
        snakes.push(snake);
    }

    let workers: Vec<_> = snakes
        .iter()
        .map(|snake| {
            let arena = Arc::clone(&arena);
            let snake = Arc::clone(snake);
            thread::spawn(move || {
                for _ in 0..STEPS {
                    // Outcomes are irrelevant here; the engine must simply
                    // never corrupt shared state.
                    let _ = arena.transition(&snake);
                }
                let cause = if snake.id() % 2 == 0 {
                    DeathCause::OtherSnake
                } else {
                    DeathCause::OwnBody
                };
                arena.record_death(&snake, cause);
                // A second report from the same snake must be ignored.
                arena.record_death(&snake, cause);
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("stress worker");
    }

    let teleports = arena.teleports();
    assert_eq!(teleports.len(), 4);
    for (entry, exit) in &teleports {
        assert_eq!(teleports.get(exit), Some(entry), "teleport map asymmetric");
    }

    assert_eq!(arena.food().len(), 6, "food pool must self-replenish");
    assert!(arena.obstacles().len() >= 4);

    let ledger = arena.death_ledger();
    assert_eq!(ledger.len(), THREADS);
    for (i, record) in ledger.iter().enumerate() {
        assert_eq!(record.rank, i as u64, "ranks must be gapless and ordered");
    }
    let unique: HashSet<SnakeId> = ledger.iter().map(|r| r.snake).collect();
    assert_eq!(unique.len(), THREADS, "every snake dies exactly once");

    let stats = arena.stats();
    assert_eq!(stats.live, 0);
    assert_eq!(stats.dead, THREADS);
    assert_eq!(stats.collision_deaths, THREADS / 2);
    assert_eq!(stats.first_dead, Some(ledger[0].snake));
}

/// A snake boxed in by another dies on its first step, terminates its own
/// runner, and lands in the ledger while the other loops keep going.
#[test]
fn one_death_does_not_disturb_the_rest() {
    let arena = Arc::new(Arena::new(30, 30).expect("valid dimensions"));
    let gate = Arc::new(PauseGate::new());

    let blocker = Arc::new(Snake::new(0, Position { x: 6, y: 5 }, Direction::Right, 5));
    blocker.advance(Position { x: 4, y: 5 }, false);
    blocker.advance(Position { x: 5, y: 4 }, false);
    blocker.advance(Position { x: 5, y: 6 }, false);
    arena.register(Arc::clone(&blocker));

    let doomed = Arc::new(Snake::new(1, Position { x: 5, y: 5 }, Direction::Right, 5));
    arena.register(Arc::clone(&doomed));

    let bystander = Arc::new(Snake::new(2, Position { x: 20, y: 20 }, Direction::Right, 5));
    arena.register(Arc::clone(&bystander));

    let doomed_handle = SnakeRunner::spawn(doomed, Arc::clone(&arena), Arc::clone(&gate));
    let bystander_handle =
        SnakeRunner::spawn(bystander, Arc::clone(&arena), Arc::clone(&gate));

    // The doomed runner exits on its own.
    doomed_handle.join();
    let ledger = arena.death_ledger();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].snake, 1);
    assert_eq!(ledger[0].cause, DeathCause::OtherSnake);

    // The bystander is still stepping.
    thread::sleep(Duration::from_millis(200));
    assert_eq!(arena.stats().live, 2);
    bystander_handle.stop();
    bystander_handle.join();
}
