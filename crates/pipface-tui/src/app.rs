//! App state, input mapping, event feed.

use std::net::SocketAddr;
use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::layout::Rect;
use tokio::sync::mpsc;

use pipface_core::channel::ChannelStats;
use pipface_core::command::Command;
use pipface_core::engine::EngineCommand;
use pipface_core::events::EngineEvent;
use pipface_core::types::FaceSnapshot;

/// Lines kept in the events panel.
const LOG_CAPACITY: usize = 200;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LogKind {
    Transition,
    Ack,
    Warning,
}

#[derive(Clone, Debug)]
pub struct LogLine {
    pub time: String,
    pub kind: LogKind,
    pub text: String,
}

pub struct App {
    pub snapshot: FaceSnapshot,
    pub log: Vec<LogLine>,
    pub acks: u64,
    pub rejected: u64,
    pub tick_failures: u64,
    pub stats: Arc<ChannelStats>,
    pub command_addr: SocketAddr,
    pub should_quit: bool,
    commands: mpsc::UnboundedSender<EngineCommand>,
}

impl App {
    pub fn new(
        snapshot: FaceSnapshot,
        commands: mpsc::UnboundedSender<EngineCommand>,
        stats: Arc<ChannelStats>,
        command_addr: SocketAddr,
    ) -> Self {
        App {
            snapshot,
            log: Vec::new(),
            acks: 0,
            rejected: 0,
            tick_failures: 0,
            stats,
            command_addr,
            should_quit: false,
            commands,
        }
    }

    fn push_log(&mut self, kind: LogKind, text: String) {
        self.log.push(LogLine {
            time: chrono::Local::now().format("%H:%M:%S").to_string(),
            kind,
            text,
        });
        if self.log.len() > LOG_CAPACITY {
            let excess = self.log.len() - LOG_CAPACITY;
            self.log.drain(..excess);
        }
    }

    /// Handle an engine event.
    pub fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Expression(t) => {
                self.push_log(
                    LogKind::Transition,
                    format!("{} -> {} ({})", t.from, t.to, t.reason),
                );
            }
            EngineEvent::Ack(ack) => {
                self.acks += 1;
                self.push_log(LogKind::Ack, format!("ack {} [{}]", ack.state, ack.command));
            }
            EngineEvent::Rejected(r) => {
                self.rejected += 1;
                self.push_log(LogKind::Warning, format!("unknown expression '{}'", r.name));
            }
            EngineEvent::TickFailed(f) => {
                self.tick_failures += 1;
                self.push_log(LogKind::Warning, format!("tick {} rolled back: {}", f.tick, f.error));
            }
            EngineEvent::Rate(_) => {}
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) | (KeyCode::Esc, _) => {
                self.should_quit = true;
            }
            _ => {
                if let Some(cmd) = key_command(key.code) {
                    self.send(EngineCommand::Wire(cmd));
                }
            }
        }
    }

    /// Translate a terminal cell inside `canvas` into canvas pixels and
    /// report it as the pointer position.
    pub fn handle_pointer(&mut self, column: u16, row: u16, canvas: Rect) {
        if let Some((x, y)) = cell_to_canvas(column, row, canvas, &self.snapshot) {
            self.send(EngineCommand::Focus { x, y });
        }
    }

    fn send(&self, cmd: EngineCommand) {
        let _ = self.commands.send(cmd);
    }
}

/// Keyboard shortcuts. Digits pick expressions, letters emit particles.
pub fn key_command(code: KeyCode) -> Option<Command> {
    let cmd = match code {
        KeyCode::Char('1') => Command::expression("sleeping"),
        KeyCode::Char('2') => Command::expression("idle"),
        KeyCode::Char('3') => Command::expression("speaking"),
        KeyCode::Char('4') => Command::expression("thinking"),
        KeyCode::Char('5') => Command::expression("surprised"),
        KeyCode::Char('6') => Command::expression("confused"),
        KeyCode::Char('7') => Command::expression("happy"),
        KeyCode::Char('8') => Command::expression("error"),
        KeyCode::Char('9') => Command::expression("working"),
        KeyCode::Char('h') => Command::default().with_particle("heart", Some(5)),
        KeyCode::Char('q') => Command::default().with_particle("question", Some(3)),
        _ => return None,
    };
    Some(cmd)
}

fn cell_to_canvas(column: u16, row: u16, canvas: Rect, snapshot: &FaceSnapshot) -> Option<(f32, f32)> {
    if canvas.width == 0 || canvas.height == 0 {
        return None;
    }
    if column < canvas.x
        || row < canvas.y
        || column >= canvas.x + canvas.width
        || row >= canvas.y + canvas.height
    {
        return None;
    }
    let fx = (column - canvas.x) as f32 + 0.5;
    let fy = (row - canvas.y) as f32 + 0.5;
    Some((
        fx / canvas.width as f32 * snapshot.canvas_width,
        fy / canvas.height as f32 * snapshot.canvas_height,
    ))
}
