use mews_thread::api::memory::MemoryApi;
use mews_thread::api::{parser, ThreadApi};
use mews_thread::app::{AppConfig, AppState};
use mews_thread::cli::Cli;
use mews_thread::config::{TreeConfig, TICK_RATE_MS};
use mews_thread::events::{AppEvent, EventHandler};
use mews_thread::input::{self, Action, InputContext, OverlayMode};
use mews_thread::model::NodeId;
use mews_thread::tree::TreeController;
use mews_thread::tui;

use clap::Parser;
use color_eyre::eyre::{eyre, Result, WrapErr};
use crossterm::execute;
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen, SetTitle};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn setup_logging(log_file: Option<&Path>) -> Result<()> {
    let log_path = match log_file {
        Some(path) => path.to_path_buf(),
        None => {
            let state_dir = state_dir();
            std::fs::create_dir_all(&state_dir)
                .map_err(|e| eyre!("Failed to create log directory {state_dir:?}: {e}"))?;
            state_dir.join("debug.log")
        }
    };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| eyre!("Failed to open log file {log_path:?}: {e}"))?;
    let filter = EnvFilter::try_from_env("MEWS_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(file)
        .with_ansi(false)
        .init();
    tracing::info!("mews v{} starting", env!("CARGO_PKG_VERSION"));
    Ok(())
}

fn state_dir() -> PathBuf {
    if let Some(state) = std::env::var_os("XDG_STATE_HOME") {
        PathBuf::from(state).join("mews")
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".local").join("state").join("mews")
    } else {
        PathBuf::from("/tmp/mews")
    }
}

/// Reads the thread document and picks the node to open.
fn load_thread(args: &Cli) -> Result<(MemoryApi, NodeId)> {
    let json = std::fs::read_to_string(&args.thread)
        .wrap_err_with(|| format!("Failed to read {}", args.thread.display()))?;
    let nodes = parser::parse_thread(&json)
        .wrap_err_with(|| format!("Failed to parse {}", args.thread.display()))?;
    let root = match &args.root {
        Some(id) => NodeId::from(id.as_str()),
        None => parser::first_root(&nodes)
            .cloned()
            .ok_or_else(|| eyre!("{} has no top-level post", args.thread.display()))?,
    };
    tracing::info!(nodes = nodes.len(), %root, "loaded thread document");
    let api = MemoryApi::from_nodes(nodes).with_latency(Duration::from_millis(args.latency_ms));
    Ok((api, root))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();

    if args.verbose || args.log_file.is_some() {
        setup_logging(args.log_file.as_deref())?;
    }

    // Fail before touching the terminal.
    let (api, root) = load_thread(&args)?;
    let api: Arc<dyn ThreadApi> = Arc::new(api);
    let mut controller = TreeController::new(api, TreeConfig::default().with_max_depth(args.max_depth));
    controller.mount(root.clone());

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        if let Err(e) = terminal::disable_raw_mode() {
            eprintln!("Failed to disable raw mode during panic: {e}");
        }
        if let Err(e) = execute!(io::stdout(), LeaveAlternateScreen, SetTitle("")) {
            eprintln!("Failed to leave alternate screen during panic: {e}");
        }
        original_hook(panic_info);
    }));

    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, SetTitle(format!("mews {root}")))?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let source = args
        .thread
        .file_name()
        .map_or_else(|| args.thread.display().to_string(), |n| n.to_string_lossy().into_owned());
    let mut state = AppState::new(
        AppConfig {
            source,
            version_string: format!("mews v{}", env!("CARGO_PKG_VERSION")),
        },
        controller,
    );

    let events = EventHandler::new(Duration::from_millis(TICK_RATE_MS));
    let result = run_app(&mut terminal, &mut state, events).await;

    // Restore terminal
    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, SetTitle(""))?;
    terminal.show_cursor()?;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: &mut AppState,
    mut events: EventHandler,
) -> Result<()> {
    loop {
        terminal.draw(|f| tui::render::render(f, state))?;

        tokio::select! {
            Some(event) = state.tree.next_event() => state.apply_tree_event(event),
            event = events.next() => match event {
                Some(AppEvent::Key(key)) => handle_key(state, key),
                Some(AppEvent::Tick) => state.tick(),
                Some(AppEvent::Resize) => {}
                Some(AppEvent::Error(e)) => {
                    tracing::error!("{e}");
                    state.set_error(e);
                }
                None => state.should_quit = true,
            },
        }

        if state.should_quit {
            state.tree.unmount();
            events.stop();
            return Ok(());
        }
    }
}

fn handle_key(state: &mut AppState, key: crossterm::event::KeyEvent) {
    let ctx = InputContext {
        has_error: state.error.is_some(),
        overlay: if state.has_composer() {
            OverlayMode::Composer
        } else if state.has_confirm() {
            OverlayMode::Confirm
        } else {
            OverlayMode::None
        },
    };
    match input::map_key(key, &ctx) {
        Action::Quit => state.should_quit = true,
        Action::DismissError => state.clear_error(),
        Action::MoveUp => state.move_cursor_up(),
        Action::MoveDown => state.move_cursor_down(),
        Action::Boost => state.boost_selected(),
        Action::Reply => state.open_reply(),
        Action::Edit => state.open_edit(),
        Action::Delete => state.open_delete(),
        Action::Focus => state.focus_selected(),
        Action::FocusParent => state.focus_parent(),
        Action::Retry => state.retry_selected(),
        Action::Expand => state.expand_selected(),
        Action::Type(c) => {
            if let Some(composer) = state.composer_mut() {
                composer.push(c);
            }
        }
        Action::Backspace => {
            if let Some(composer) = state.composer_mut() {
                composer.backspace();
            }
        }
        Action::NextField => {
            if let Some(composer) = state.composer_mut() {
                composer.next_field();
            }
        }
        Action::Submit => state.submit_overlay(),
        Action::Cancel => state.cancel_overlay(),
        Action::None => {}
    }
}
