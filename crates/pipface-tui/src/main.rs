//! pipface-tui: terminal face, one-shot command sender, headless daemon.
//!
//! ```text
//! pipface-tui                      run the face in the terminal
//! pipface-tui --headless           engine + sockets, no terminal
//! pipface-tui --watch-acks         print acknowledgements as they arrive
//! pipface-tui state=happy duration=2
//!                                  send one command and exit
//! ```

mod app;
mod ui;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture, Event, MouseEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{info, warn};

use pipface_core::client::{AckListener, FaceClient};
use pipface_core::command::Command;
use pipface_core::config::Config;
use pipface_core::service::Service;

use app::App;

enum Mode {
    Tui,
    Headless,
    WatchAcks,
    Send(Vec<String>),
}

fn parse_mode(args: Vec<String>) -> Mode {
    match args.first().map(String::as_str) {
        None => Mode::Tui,
        Some("--headless") => Mode::Headless,
        Some("--watch-acks") => Mode::WatchAcks,
        Some(_) => Mode::Send(args),
    }
}

fn init_stderr_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .try_init();
}

/// Log to a file, not stdout, since we own the terminal.
fn init_file_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("pipface-tui.log");
    let _ = match file {
        Ok(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .try_init(),
        Err(_) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init(),
    };
}

/// `pipface.yaml` in the working directory, else defaults plus env overrides.
fn load_config() -> Config {
    let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    match Config::load_from_dir(&project_root) {
        Ok(config) => config,
        Err(e) => {
            info!("Using default config ({:#})", e);
            let mut config = Config::default();
            config.apply_env();
            if let Err(e) = config.validate() {
                warn!("Ignoring environment overrides: {}", e);
                return Config::default();
            }
            config
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mode = parse_mode(std::env::args().skip(1).collect());

    match mode {
        Mode::Tui => {
            init_file_logging();
            run_tui(load_config()).await
        }
        Mode::Headless => {
            init_stderr_logging();
            run_headless(load_config()).await
        }
        Mode::WatchAcks => {
            init_stderr_logging();
            watch_acks(load_config()).await
        }
        Mode::Send(args) => {
            init_stderr_logging();
            send_once(load_config(), &args).await
        }
    }
}

async fn send_once(config: Config, args: &[String]) -> Result<()> {
    let command = Command::from_key_values(args).context("Usage: pipface-tui key=value ...")?;
    let client = FaceClient::from_config(&config).await?;
    client.send(&command).await?;
    println!(
        "sent {} to {}",
        String::from_utf8_lossy(&command.encode()),
        client.target()
    );
    Ok(())
}

async fn watch_acks(config: Config) -> Result<()> {
    let listener = AckListener::bind(config.ack_addr()).await?;
    eprintln!("Watching acknowledgements on {} (Ctrl-C to stop)", config.ack_addr());
    loop {
        tokio::select! {
            ack = listener.recv(Duration::from_secs(60)) => {
                if let Some(ack) = ack? {
                    println!("{}", serde_json::to_string(&ack)?);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

async fn run_headless(config: Config) -> Result<()> {
    let service = Service::start(config).await?;
    eprintln!("pipface listening on {} (Ctrl-C to stop)", service.command_addr());
    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl-C handler")?;
    info!("Shutdown signal received");
    service.shutdown().await
}

async fn run_tui(config: Config) -> Result<()> {
    let service = Service::start(config).await?;
    let mut events = service.subscribe();
    let snapshots = service.snapshots();

    let mut app = App::new(
        snapshots.borrow().clone(),
        service.command_sender(),
        service.stats(),
        service.command_addr(),
    );
    info!("Starting TUI, commands on {}", service.command_addr());

    // Setup terminal
    enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    io::stdout().execute(EnableMouseCapture)?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, &mut app, &mut events, &snapshots);

    // Cleanup
    disable_raw_mode()?;
    io::stdout().execute(DisableMouseCapture)?;
    io::stdout().execute(LeaveAlternateScreen)?;

    service.shutdown().await?;
    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    events: &mut tokio::sync::broadcast::Receiver<pipface_core::events::EngineEvent>,
    snapshots: &tokio::sync::watch::Receiver<pipface_core::types::FaceSnapshot>,
) -> Result<()> {
    loop {
        app.snapshot = snapshots.borrow().clone();
        terminal.draw(|frame| ui::draw(frame, app))?;

        // Engine events (non-blocking)
        loop {
            match events.try_recv() {
                Ok(event) => app.handle_event(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }

        // One frame at the active rate is plenty.
        if event::poll(Duration::from_millis(33))? {
            match event::read()? {
                Event::Key(key) => app.handle_key(key),
                Event::Mouse(mouse) => {
                    if matches!(mouse.kind, MouseEventKind::Moved | MouseEventKind::Drag(_)) {
                        let size = terminal.size()?;
                        let canvas = ui::canvas_area(Rect::new(0, 0, size.width, size.height));
                        app.handle_pointer(mouse.column, mouse.row, canvas);
                    }
                }
                _ => {}
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
