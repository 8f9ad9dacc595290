//! Face renderer: draws a snapshot onto a braille canvas.
//!
//! All geometry is computed in canvas pixels with y growing downward, the
//! same space the engine uses, and flipped at the last moment because the
//! ratatui canvas puts y = 0 at the bottom.

use rand::Rng;
use ratatui::prelude::*;
use ratatui::symbols::Marker;
use ratatui::widgets::canvas::{Canvas, Context, Line as Segment};

use pipface_core::types::{FaceParameters, FaceSnapshot};

const BODY_RADIUS: f64 = 95.0;
const EYE_SPACING: f64 = 38.0;
const EYE_RISE: f64 = 15.0;
const EYE_HEIGHT: f64 = 16.0;
const EYE_WIDTH: f64 = 12.0;
const MOUTH_DROP: f64 = 35.0;

const EYE_WHITE: (u8, u8, u8) = (250, 250, 250);
const INK: (u8, u8, u8) = (45, 30, 35);
const MOUTH: (u8, u8, u8) = (110, 40, 55);
const BLUSH: (u8, u8, u8) = (255, 100, 130);
const BACKGROUND: (u8, u8, u8) = (0, 0, 0);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum EyeStyle {
    Open,
    Closed,
    Happy,
    Cross,
}

fn eye_style(expression: &str, params: &FaceParameters) -> EyeStyle {
    match expression {
        "happy" => EyeStyle::Happy,
        "error" => EyeStyle::Cross,
        _ if params.eye_open < 0.15 => EyeStyle::Closed,
        _ => EyeStyle::Open,
    }
}

fn rgb((r, g, b): (u8, u8, u8)) -> Color {
    Color::Rgb(r, g, b)
}

/// Linear mix from `a` to `b`.
fn mix(a: (u8, u8, u8), b: (u8, u8, u8), t: f32) -> (u8, u8, u8) {
    let t = t.clamp(0.0, 1.0);
    let ch = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * t).round() as u8;
    (ch(a.0, b.0), ch(a.1, b.1), ch(a.2, b.2))
}

/// Draws in y-down canvas pixels.
struct Pen<'c, 'a> {
    ctx: &'c mut Context<'a>,
    height: f64,
}

impl Pen<'_, '_> {
    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, color: Color) {
        self.ctx.draw(&Segment::new(x1, self.height - y1, x2, self.height - y2, color));
    }

    fn polyline(&mut self, points: &[(f64, f64)], color: Color) {
        for pair in points.windows(2) {
            self.line(pair[0].0, pair[0].1, pair[1].0, pair[1].1, color);
        }
    }

    /// Filled ellipse as a stack of horizontal spans.
    fn ellipse(&mut self, cx: f64, cy: f64, rx: f64, ry: f64, color: Color) {
        if rx <= 0.0 || ry <= 0.0 {
            return;
        }
        let mut dy = -ry;
        while dy <= ry {
            let half = rx * (1.0 - (dy / ry).powi(2)).max(0.0).sqrt();
            self.line(cx - half, cy + dy, cx + half, cy + dy, color);
            dy += 1.5;
        }
    }

    fn next_layer(&mut self) {
        self.ctx.layer();
    }
}

pub fn draw(frame: &mut Frame, snapshot: &FaceSnapshot, area: Rect) {
    let width = snapshot.canvas_width as f64;
    let height = snapshot.canvas_height as f64;

    let shake = snapshot.params.shake;
    let (jx, jy) = if shake > 0.05 {
        let mut rng = rand::thread_rng();
        (rng.gen_range(-shake..shake) as f64, rng.gen_range(-shake..shake) as f64)
    } else {
        (0.0, 0.0)
    };
    let cx = width / 2.0 + jx;
    let cy = height / 2.0 + snapshot.float_y as f64 + jy;

    let canvas = Canvas::default()
        .marker(Marker::Braille)
        .x_bounds([0.0, width])
        .y_bounds([0.0, height])
        .paint(move |ctx| {
            let mut pen = Pen { ctx, height };
            paint_face(&mut pen, snapshot, cx, cy);
            pen.next_layer();
            paint_particles(&mut pen, snapshot);
        });
    frame.render_widget(canvas, area);
}

fn paint_face(pen: &mut Pen, snapshot: &FaceSnapshot, cx: f64, cy: f64) {
    let p = &snapshot.params;
    let body = p.color.to_u8();

    pen.ellipse(cx, cy, BODY_RADIUS * 1.15, BODY_RADIUS, rgb(body));
    pen.next_layer();

    if p.blush > 0.02 {
        let tint = rgb(mix(body, BLUSH, p.blush));
        pen.ellipse(cx - 60.0, cy + 12.0, 14.0, 7.0, tint);
        pen.ellipse(cx + 60.0, cy + 12.0, 14.0, 7.0, tint);
    }
    pen.next_layer();

    let style = eye_style(&snapshot.expression, p);
    let scale = p.eye_scale as f64;
    let ew = EYE_WIDTH * scale;
    let full_h = EYE_HEIGHT * scale;
    let eh = full_h * p.eye_open as f64;
    let ey = cy - EYE_RISE;

    for (side, brow_y, brow_angle) in [
        (-1.0, p.brow_left_y, p.brow_left_angle),
        (1.0, p.brow_right_y, p.brow_right_angle),
    ] {
        let ex = cx + side * EYE_SPACING;
        match style {
            EyeStyle::Happy => pen.polyline(
                &[(ex - ew, ey + 3.0), (ex, ey - 6.0), (ex + ew, ey + 3.0)],
                rgb(INK),
            ),
            EyeStyle::Cross => {
                pen.line(ex - ew * 0.7, ey - ew * 0.7, ex + ew * 0.7, ey + ew * 0.7, rgb(INK));
                pen.line(ex - ew * 0.7, ey + ew * 0.7, ex + ew * 0.7, ey - ew * 0.7, rgb(INK));
            }
            EyeStyle::Closed => pen.line(ex - ew, ey, ex + ew, ey, rgb(INK)),
            EyeStyle::Open => {
                pen.ellipse(ex, ey, ew, eh, rgb(EYE_WHITE));
                let pr = ew * (0.3 + 0.5 * p.pupil_scale as f64);
                let px = ex + p.pupil_x as f64 * (ew - pr * 0.5);
                let py = ey + p.pupil_y as f64 * (eh - pr * 0.5).max(0.0);
                pen.ellipse(px, py, pr, pr.min(eh), rgb(INK));
            }
        }

        // Brow: raised by brow_y, tilted by the angle (degrees), mirrored per side.
        let by = ey - full_h - 8.0 - brow_y as f64 * 10.0;
        let a = (brow_angle as f64).to_radians();
        let (dx, dy) = (12.0 * a.cos(), 12.0 * a.sin() * side);
        pen.line(ex - dx, by + dy, ex + dx, by - dy, rgb(INK));
    }

    paint_mouth(pen, p, cx, cy + MOUTH_DROP);
}

fn paint_mouth(pen: &mut Pen, p: &FaceParameters, mx: f64, my: f64) {
    const STEPS: usize = 16;
    let half = 30.0 * p.mouth_width as f64;
    let bow = p.mouth_curve as f64 * 12.0;
    let gap = p.mouth_open as f64 * 18.0;

    let mut upper = Vec::with_capacity(STEPS + 1);
    let mut lower = Vec::with_capacity(STEPS + 1);
    for i in 0..=STEPS {
        let t = i as f64 / STEPS as f64;
        let shape = 1.0 - (2.0 * t - 1.0).powi(2);
        let x = mx - half + 2.0 * half * t;
        let y = my + bow * shape;
        upper.push((x, y));
        lower.push((x, y + gap * shape));
    }

    if gap > 1.0 {
        for (u, l) in upper.iter().zip(&lower) {
            pen.line(u.0, u.1, l.0, l.1, rgb(MOUTH));
        }
        pen.polyline(&lower, rgb(INK));
    }
    pen.polyline(&upper, rgb(INK));
}

fn paint_particles(pen: &mut Pen, snapshot: &FaceSnapshot) {
    for particle in &snapshot.particles {
        let color = mix(BACKGROUND, particle.kind.color(), particle.opacity());
        let x = particle.x as f64;
        let y = pen.height - particle.y as f64;
        pen.ctx.print(
            x,
            y,
            Span::styled(particle.kind.symbol().to_string(), Style::default().fg(rgb(color))),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eye_style_variants() {
        let mut p = FaceParameters::default();
        assert_eq!(eye_style("idle", &p), EyeStyle::Open);
        assert_eq!(eye_style("happy", &p), EyeStyle::Happy);
        assert_eq!(eye_style("error", &p), EyeStyle::Cross);
        p.eye_open = 0.1;
        assert_eq!(eye_style("idle", &p), EyeStyle::Closed);
    }

    #[test]
    fn test_mix_fades_to_background() {
        assert_eq!(mix(BACKGROUND, (200, 100, 50), 0.0), BACKGROUND);
        assert_eq!(mix(BACKGROUND, (200, 100, 50), 1.0), (200, 100, 50));
        assert_eq!(mix(BACKGROUND, (200, 100, 50), 0.5), (100, 50, 25));
    }
}
