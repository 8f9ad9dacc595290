//! TUI layout compositing: assembles all UI panels.

mod face;
mod log;
mod status;

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders};

use crate::app::App;

/// Width of the events panel.
const LOG_WIDTH: u16 = 38;

struct Areas {
    face: Rect,
    log: Rect,
    status: Rect,
}

fn split(area: Rect) -> Areas {
    // ┌──────────────────────┬───────────┐
    // │                      │  Events   │
    // │        Face          │           │
    // │                      │           │
    // ├──────────────────────┴───────────┤
    // │ Status bar                       │
    // └──────────────────────────────────┘
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),    // content
            Constraint::Length(1), // status
        ])
        .split(area);

    let content_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(30), Constraint::Length(LOG_WIDTH)])
        .split(main_layout[0]);

    Areas {
        face: content_layout[0],
        log: content_layout[1],
        status: main_layout[1],
    }
}

fn face_block(expression: &str) -> Block<'_> {
    Block::default()
        .title(format!(" {} ", expression))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
}

/// Terminal cells the face canvas occupies inside `area` (the full frame).
pub fn canvas_area(area: Rect) -> Rect {
    face_block("").inner(split(area).face)
}

/// Render the full TUI layout.
pub fn draw(frame: &mut Frame, app: &App) {
    let areas = split(frame.area());

    let block = face_block(&app.snapshot.expression);
    let inner = block.inner(areas.face);
    frame.render_widget(block, areas.face);
    face::draw(frame, &app.snapshot, inner);

    log::draw(frame, app, areas.log);
    status::draw(frame, app, areas.status);
}
