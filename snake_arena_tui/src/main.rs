use anyhow::Result;
use clap::Parser;
use rand::Rng;
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    layout::Direction as LayoutDirection,
    prelude::*,
    widgets::*,
};
use snake_arena_core::{
    Direction, Position,
    arena::Arena,
    clock::TickClock,
    pause::PauseGate,
    runner::{RunnerHandle, SnakeRunner},
    snake::Snake,
};
use std::{
    collections::HashSet,
    io::{self, Stdout},
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::info;

const START_CAPACITY: usize = 5;
const SNAKE_COLORS: [Color; 6] = [
    Color::Green,
    Color::Cyan,
    Color::Magenta,
    Color::LightRed,
    Color::LightBlue,
    Color::LightYellow,
];

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of snakes to spawn
    #[arg(short, long, default_value_t = 4)]
    snakes: usize,
    /// Grid width in cells
    #[arg(long, default_value_t = 60)]
    width: usize,
    /// Grid height in cells
    #[arg(long, default_value_t = 40)]
    height: usize,
    /// Render period in milliseconds
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,
}

struct App {
    /// The shared simulation state.
    arena: Arc<Arena>,
    /// Run/pause coordination shared with every runner.
    gate: Arc<PauseGate>,
    /// One handle per spawned control loop.
    runners: Vec<RunnerHandle>,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn new(args: &Args) -> Result<Self> {
        let arena = Arc::new(Arena::new(args.width, args.height)?);
        let gate = Arc::new(PauseGate::new());

        let mut occupied = HashSet::new();
        let mut runners = Vec::with_capacity(args.snakes);
        for id in 0..args.snakes {
            let start = free_start(&arena, &occupied);
            occupied.insert(start);
            let snake = Arc::new(Snake::new(id, start, Direction::Right, START_CAPACITY));
            arena.register(Arc::clone(&snake));
            runners.push(SnakeRunner::spawn(
                snake,
                Arc::clone(&arena),
                Arc::clone(&gate),
            ));
        }
        info!(
            snakes = args.snakes,
            width = args.width,
            height = args.height,
            "arena ready"
        );

        Ok(App {
            arena,
            gate,
            runners,
            should_quit: false,
        })
    }

    fn toggle_pause(&self) {
        if self.gate.is_paused() {
            self.gate.resume();
        } else {
            self.gate.pause();
        }
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }

    /// Stops every runner and waits for the threads to exit.
    fn shutdown(self) {
        for runner in &self.runners {
            runner.stop();
        }
        for runner in self.runners {
            runner.join();
        }
        info!("all runners joined");
    }
}

/// Picks a start cell avoiding other starts and every item pool, with
/// bounded retries and a deterministic fallback.
fn free_start(arena: &Arena, occupied: &HashSet<Position>) -> Position {
    let (width, height) = (arena.width(), arena.height());
    let food = arena.food();
    let obstacles = arena.obstacles();
    let boosts = arena.boosts();
    let teleports = arena.teleports();

    let mut rng = rand::rng();
    for _ in 0..width * height * 2 {
        let cell = Position {
            x: rng.random_range(0..width),
            y: rng.random_range(0..height),
        };
        if occupied.contains(&cell)
            || food.contains(&cell)
            || obstacles.contains(&cell)
            || boosts.contains(&cell)
            || teleports.contains_key(&cell)
        {
            continue;
        }
        return cell;
    }
    let fallback = Position { x: 0, y: 0 };
    if occupied.contains(&fallback) {
        Position { x: 1, y: 1 }
    } else {
        fallback
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    if args.snakes == 0 {
        return Err(anyhow::anyhow!("at least one snake is required"));
    }

    // Build the simulation before touching the terminal so configuration
    // errors print plainly.
    let mut app = App::new(&args)?;

    // Periodic stats heartbeat, independent of the render loop.
    let mut heartbeat = {
        let arena = Arc::clone(&app.arena);
        TickClock::new(Duration::from_secs(5), Arc::clone(&app.gate), move || {
            let stats = arena.stats();
            info!(
                live = stats.live,
                dead = stats.dead,
                collision_deaths = stats.collision_deaths,
                "heartbeat"
            );
        })?
    };
    heartbeat.start();

    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &mut app, Duration::from_millis(args.tick_ms));
    restore_terminal(&mut terminal)?;

    heartbeat.close();
    app.shutdown();

    result
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application. The simulation advances on
/// its own threads; this loop only draws and handles keys.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    KeyCode::Char('p') | KeyCode::Char(' ') => app.toggle_pause(),
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let main_layout = Layout::default()
        .direction(LayoutDirection::Vertical)
        .constraints([
            Constraint::Percentage(70), // Arena map
            Constraint::Percentage(20), // Per-snake details
            Constraint::Percentage(10), // Status and help
        ])
        .split(frame.area());

    render_map(frame, main_layout[0], &app.arena);
    render_snakes(frame, main_layout[1], &app.arena);
    render_status(frame, main_layout[2], app);
}

/// Renders the arena map: item pools first, snake bodies on top.
fn render_map(frame: &mut Frame, area: Rect, arena: &Arena) {
    let width = arena.width();
    let height = arena.height();
    let mut cells = vec![vec![Span::raw(" "); width]; height];

    for p in arena.food() {
        cells[p.y][p.x] = Span::styled("*", Style::default().fg(Color::Yellow));
    }
    for p in arena.boosts() {
        cells[p.y][p.x] = Span::styled("+", Style::default().fg(Color::Cyan));
    }
    for p in arena.teleports().keys() {
        cells[p.y][p.x] = Span::styled("T", Style::default().fg(Color::Magenta));
    }
    for p in arena.obstacles() {
        cells[p.y][p.x] = Span::styled("#", Style::default().fg(Color::DarkGray));
    }

    for snake in arena.snakes() {
        let color = SNAKE_COLORS[snake.id() % SNAKE_COLORS.len()];
        for (i, cell) in snake.body_snapshot().iter().enumerate() {
            let glyph = if i == 0 { "@" } else { "o" };
            let style = if i == 0 {
                Style::default().fg(color).bold()
            } else {
                Style::default().fg(color)
            };
            cells[cell.y][cell.x] = Span::styled(glyph, style);
        }
    }

    let lines: Vec<Line> = cells.into_iter().map(Line::from).collect();
    let map = Paragraph::new(lines)
        .block(Block::default().title("Snake Arena").borders(Borders::ALL))
        .alignment(Alignment::Center);
    frame.render_widget(map, area);
}

/// Renders one line per live snake.
fn render_snakes(frame: &mut Frame, area: Rect, arena: &Arena) {
    let rows: Vec<ListItem> = arena
        .snakes()
        .iter()
        .map(|snake| {
            let color = SNAKE_COLORS[snake.id() % SNAKE_COLORS.len()];
            let head = snake.head();
            let line = Line::from(vec![
                Span::styled("@ ", Style::default().fg(color)),
                Span::raw(format!(
                    "snake {} len {} head ({}, {}) heading {:?}",
                    snake.id(),
                    snake.len(),
                    head.x,
                    head.y,
                    snake.direction(),
                )),
            ]);
            ListItem::from(line)
        })
        .collect();

    let list =
        List::new(rows).block(Block::default().borders(Borders::ALL).title("Snakes"));
    frame.render_widget(list, area);
}

/// Renders stats plus the key hints.
fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let stats = app.arena.stats();
    let state = if app.gate.is_paused() {
        Span::styled("PAUSED", Style::default().fg(Color::Red).bold())
    } else {
        Span::styled("RUNNING", Style::default().fg(Color::Green).bold())
    };
    let longest = stats
        .longest_live
        .map(|(id, len)| format!("longest snake {id} (len {len})"))
        .unwrap_or_else(|| "no snakes alive".to_string());
    let first_dead = stats
        .first_dead
        .map(|id| format!(", first death snake {id}"))
        .unwrap_or_default();

    let text = vec![
        Line::from(vec![
            state,
            Span::raw(format!(
                "  live {} dead {} (collisions {}) | {}{}",
                stats.live, stats.dead, stats.collision_deaths, longest, first_dead
            )),
        ]),
        Line::from("'p'/space: pause/resume | 'q'/Esc: quit"),
    ];
    let status = Paragraph::new(text)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(status, area);
}
