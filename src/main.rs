mod ui;

use anyhow::{Context, Result};
use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    cursor::Show,
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use reactnow::{
    clock::{Clock, SystemClock},
    config::{Config, ConfigStore, FileConfigStore},
    game::{Game, Phase},
    logging,
    runtime::{CrosstermEventSource, FixedTicker, GameEvent, Runner},
};
use std::{
    io::{self, stdin, Write},
    path::PathBuf,
    time::Duration,
};
use tracing::{error, info};

const TICK_RATE_MS: u64 = 16;

/// lights out and away we go: test your reaction time against a racing start
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Five red lights come on one by one. When they go out, wait for the signal and hit space as fast as you can."
)]
pub struct Cli {
    /// seconds before the first light comes on
    #[clap(long = "initial-delay")]
    initial_delay: Option<f64>,

    /// seconds between consecutive lights
    #[clap(long)]
    inter_light_delay: Option<f64>,

    /// seconds all five lights stay on before going out
    #[clap(long)]
    hold: Option<f64>,

    /// seconds from lights out to the go signal when --fixed-go is set
    #[clap(long)]
    announce_gap: Option<f64>,

    /// lower bound of the randomized go delay, in seconds
    #[clap(long)]
    min_go_delay: Option<f64>,

    /// upper bound of the randomized go delay, in seconds
    #[clap(long)]
    max_go_delay: Option<f64>,

    /// always wait exactly the announce gap instead of a random delay
    #[clap(long)]
    fixed_go: bool,

    /// seed for the go delay so a sequence can be replayed
    #[clap(long)]
    seed: Option<u64>,

    /// write the effective timings back to the config file
    #[clap(long)]
    save_config: bool,

    /// config file to use instead of the platform default
    #[clap(short = 'c', long)]
    config: Option<PathBuf>,

    /// log file to use instead of the platform default
    #[clap(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    /// Command line values win over the config file
    fn apply(&self, cfg: Config) -> Config {
        Config {
            initial_light_delay: self.initial_delay.unwrap_or(cfg.initial_light_delay),
            inter_light_delay: self.inter_light_delay.unwrap_or(cfg.inter_light_delay),
            extinguish_hold: self.hold.unwrap_or(cfg.extinguish_hold),
            announce_gap: self.announce_gap.unwrap_or(cfg.announce_gap),
            min_go_delay: self.min_go_delay.unwrap_or(cfg.min_go_delay),
            max_go_delay: self.max_go_delay.unwrap_or(cfg.max_go_delay),
            randomize_go: cfg.randomize_go && !self.fixed_go,
        }
    }

    fn config_store(&self) -> FileConfigStore {
        match &self.config {
            Some(path) => FileConfigStore::with_path(path),
            None => FileConfigStore::new(),
        }
    }
}

#[derive(Debug)]
pub struct App<K = SystemClock> {
    pub game: Game<K>,
    pub should_quit: bool,
}

impl<K: Clock + 'static> App<K> {
    pub fn new(game: Game<K>) -> Self {
        Self {
            game,
            should_quit: false,
        }
    }

    pub fn on_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }

        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('r') => self.game.reset(),
            KeyCode::Char('s') | KeyCode::Enter => match self.game.state().phase() {
                Phase::Ready => {
                    self.game.start();
                }
                Phase::Result => {
                    self.game.reset();
                    self.game.start();
                }
                _ => {}
            },
            KeyCode::Char(' ') => {
                self.game.tap();
            }
            _ => {}
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    logging::init_tracing(cli.log_file.as_deref());

    let store = cli.config_store();
    let config = cli.apply(store.load());
    let timings = config
        .timings()
        .context("invalid timing configuration")?;
    if cli.save_config {
        store
            .save(&config)
            .with_context(|| format!("failed to save config to {}", store.path().display()))?;
        info!(path = %store.path().display(), "config saved");
    }

    let mut app = App::new(Game::with_clock(timings, SystemClock, cli.seed));

    let mut guard = TerminalGuard::new(io::stdout());
    guard.enter()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let result = run(&mut terminal, &mut app);
    drop(guard);

    if let Err(e) = &result {
        error!(error = %e, "exiting on error");
    }
    result
}

/// Raw mode and the alternate screen, undone on drop. Only what was
/// actually entered gets restored, so a failed setup still leaves the
/// terminal usable.
struct TerminalGuard<W: Write> {
    out: W,
    raw_mode: bool,
    alternate_screen: bool,
}

impl<W: Write> TerminalGuard<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            raw_mode: false,
            alternate_screen: false,
        }
    }

    fn enter(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        self.raw_mode = true;
        execute!(self.out, EnterAlternateScreen)?;
        self.alternate_screen = true;
        Ok(())
    }
}

impl<W: Write> Drop for TerminalGuard<W> {
    fn drop(&mut self) {
        if self.alternate_screen {
            if let Err(e) = execute!(self.out, LeaveAlternateScreen, Show) {
                error!(error = %e, "failed to leave alternate screen");
            }
        }
        if self.raw_mode {
            if let Err(e) = disable_raw_mode() {
                error!(error = %e, "failed to disable raw mode");
            }
        }
    }
}

fn run<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );

    terminal.draw(|f| ui::draw(app, f))?;

    while !app.should_quit {
        let before = app.game.snapshot();
        let event = runner.step_until(app.game.next_deadline());

        let mut redraw = false;
        match event {
            GameEvent::Key(key) => {
                app.on_key(key);
                redraw = true;
            }
            GameEvent::Resize => redraw = true,
            GameEvent::Tick => {}
        }
        app.game.tick();

        if redraw || app.game.snapshot() != before {
            terminal.draw(|f| ui::draw(app, f))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use reactnow::{clock::ManualClock, config::Timings, game::GameState};
    use tempfile::tempdir;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn test_app() -> (App<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let game = Game::with_clock(Timings::default(), clock.clone(), Some(1));
        (App::new(game), clock)
    }

    fn run_until(app: &mut App<ManualClock>, clock: &ManualClock, phase: Phase) {
        for _ in 0..2_000 {
            if app.game.state().phase() == phase {
                return;
            }
            clock.advance_millis(TICK_RATE_MS);
            app.game.tick();
        }
        panic!("never reached {phase}");
    }

    #[test]
    fn test_terminal_guard_restores_alternate_screen() {
        let mut out = Vec::new();
        {
            let mut guard = TerminalGuard::new(&mut out);
            guard.alternate_screen = true;
        }
        let written = String::from_utf8(out).unwrap();
        assert!(written.contains("\x1b[?1049l"), "{written:?}");
        assert!(written.contains("\x1b[?25h"), "{written:?}");
    }

    #[test]
    fn test_terminal_guard_without_setup_writes_nothing() {
        let mut out = Vec::new();
        drop(TerminalGuard::new(&mut out));
        assert!(out.is_empty());
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::parse_from(["reactnow"]);

        assert_eq!(cli.initial_delay, None);
        assert_eq!(cli.inter_light_delay, None);
        assert_eq!(cli.seed, None);
        assert!(!cli.fixed_go);
        assert!(!cli.save_config);
        assert_eq!(cli.apply(Config::default()), Config::default());
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "reactnow",
            "--initial-delay",
            "1.0",
            "--inter-light-delay",
            "0.4",
            "--hold",
            "0.2",
            "--min-go-delay",
            "1",
            "--max-go-delay",
            "3",
            "--seed",
            "99",
        ]);
        let cfg = cli.apply(Config::default());

        assert_eq!(cfg.initial_light_delay, 1.0);
        assert_eq!(cfg.inter_light_delay, 0.4);
        assert_eq!(cfg.extinguish_hold, 0.2);
        assert_eq!(cfg.announce_gap, 0.3);
        assert_eq!(cfg.min_go_delay, 1.0);
        assert_eq!(cfg.max_go_delay, 3.0);
        assert!(cfg.randomize_go);
        assert_eq!(cli.seed, Some(99));
    }

    #[test]
    fn test_cli_fixed_go_disables_randomization() {
        let cli = Cli::parse_from(["reactnow", "--fixed-go", "--announce-gap", "0.3"]);
        let cfg = cli.apply(Config::default());
        assert!(!cfg.randomize_go);
        assert!(!cfg.timings().unwrap().randomize_go);
    }

    #[test]
    fn test_cli_keeps_file_settings_without_flags() {
        let file = Config {
            randomize_go: false,
            max_go_delay: 9.0,
            ..Config::default()
        };
        let cli = Cli::parse_from(["reactnow"]);
        assert_eq!(cli.apply(file.clone()), file);
    }

    #[test]
    fn test_cli_config_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.json");
        let cli = Cli::parse_from(["reactnow", "-c", path.to_str().unwrap()]);
        assert_eq!(cli.config_store().path(), path.as_path());
    }

    #[test]
    fn test_start_key_starts_round() {
        let (mut app, _) = test_app();
        app.on_key(key(KeyCode::Char('s')));
        assert_eq!(app.game.state(), GameState::Signaling { lit_count: 0 });

        let (mut app, _) = test_app();
        app.on_key(key(KeyCode::Enter));
        assert_eq!(app.game.state().phase(), Phase::Signaling);
    }

    #[test]
    fn test_space_before_go_is_ignored() {
        let (mut app, clock) = test_app();
        app.on_key(key(KeyCode::Char(' ')));
        assert_eq!(app.game.state(), GameState::Ready);

        app.on_key(key(KeyCode::Char('s')));
        run_until(&mut app, &clock, Phase::Waiting);
        app.on_key(key(KeyCode::Char(' ')));
        assert_eq!(app.game.state(), GameState::Waiting);
    }

    #[test]
    fn test_full_round_through_keys() {
        let (mut app, clock) = test_app();
        app.on_key(key(KeyCode::Char('s')));
        run_until(&mut app, &clock, Phase::TapNow);

        clock.advance_millis(180);
        app.on_key(key(KeyCode::Char(' ')));
        let reaction = app.game.reaction_millis().unwrap();
        assert!((reaction - 180.0).abs() < 1e-6);

        // play again from the result screen
        app.on_key(key(KeyCode::Enter));
        assert_eq!(app.game.state(), GameState::Signaling { lit_count: 0 });
        assert_eq!(app.game.reaction_millis(), None);
    }

    #[test]
    fn test_start_key_mid_round_is_ignored() {
        let (mut app, clock) = test_app();
        app.on_key(key(KeyCode::Char('s')));
        clock.advance_millis(600);
        app.game.tick();
        app.on_key(key(KeyCode::Char('s')));
        assert_eq!(app.game.state(), GameState::Signaling { lit_count: 1 });
    }

    #[test]
    fn test_reset_key_from_any_state() {
        let (mut app, clock) = test_app();
        app.on_key(key(KeyCode::Char('s')));
        run_until(&mut app, &clock, Phase::Waiting);

        app.on_key(key(KeyCode::Char('r')));
        assert_eq!(app.game.state(), GameState::Ready);
        assert!(!app.game.has_pending_timers());
    }

    #[test]
    fn test_quit_keys() {
        let (mut app, _) = test_app();
        app.on_key(key(KeyCode::Esc));
        assert!(app.should_quit);

        let (mut app, _) = test_app();
        app.on_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit);
        assert_eq!(app.game.state(), GameState::Ready);
    }

    #[test]
    fn test_tick_rate_constant() {
        assert!(TICK_RATE_MS > 0);
        assert!(TICK_RATE_MS <= 50);
    }
}
