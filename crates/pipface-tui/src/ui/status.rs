//! Status bar: expression, rate, particles, channel counters.

use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use crate::app::App;

pub fn draw(frame: &mut Frame, app: &App, area: Rect) {
    let snap = &app.snapshot;
    let (r, g, b) = snap.params.color.to_u8();

    let mut spans = vec![
        Span::styled(
            format!(" {} ", snap.expression),
            Style::default().fg(Color::Black).bg(Color::Rgb(r, g, b)),
        ),
        Span::raw(format!(" {} fps ", snap.fps)),
        Span::styled(
            format!(" particles: {} ", snap.particles.len()),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw(format!(
            " rx {} / dropped {} on {} ",
            app.stats.received(),
            app.stats.dropped(),
            app.command_addr
        )),
    ];

    if app.rejected > 0 || app.tick_failures > 0 {
        spans.push(Span::styled(
            format!(" rejected {} / rolled back {} ", app.rejected, app.tick_failures),
            Style::default().fg(Color::Yellow),
        ));
    }

    spans.push(Span::styled(
        " 1-9 expressions  h hearts  q questions  Esc quit",
        Style::default().fg(Color::DarkGray),
    ));

    let status = Paragraph::new(Line::from(spans));
    frame.render_widget(status, area);
}
