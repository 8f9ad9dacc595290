//! Events panel: transitions, acks and warnings, newest at the bottom.

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::app::{App, LogKind};

pub fn draw(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Events ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if app.log.is_empty() {
        let empty = Paragraph::new("Waiting for commands...")
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, inner);
        return;
    }

    let visible = inner.height as usize;
    let start = app.log.len().saturating_sub(visible);

    let lines: Vec<Line> = app.log[start..]
        .iter()
        .map(|entry| {
            let fg = match entry.kind {
                LogKind::Transition => Color::Green,
                LogKind::Ack => Color::Cyan,
                LogKind::Warning => Color::Yellow,
            };
            Line::from(vec![
                Span::styled(format!("{} ", entry.time), Style::default().fg(Color::DarkGray)),
                Span::styled(entry.text.clone(), Style::default().fg(fg)),
            ])
        })
        .collect();

    frame.render_widget(Paragraph::new(lines), inner);
}
