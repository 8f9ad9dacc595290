//! Core types: FaceParameters, snapshots, acknowledgements, event payloads.

use serde::{Deserialize, Serialize};

use crate::particles::Particle;

// ── Parameter ranges ──

/// Inclusive range a face parameter is held within.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f32,
    pub max: f32,
}

impl Range {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, v: f32) -> f32 {
        v.clamp(self.min, self.max)
    }
}

pub const UNIT: Range = Range::new(0.0, 1.0);
pub const SIGNED: Range = Range::new(-1.0, 1.0);
pub const EYE_SCALE: Range = Range::new(0.5, 2.0);
/// Brow tilt in degrees.
pub const BROW_ANGLE: Range = Range::new(-45.0, 45.0);
pub const MOUTH_WIDTH: Range = Range::new(0.0, 1.5);
pub const CHANNEL: Range = Range::new(0.0, 255.0);
/// Shake amplitude in canvas pixels.
pub const SHAKE: Range = Range::new(0.0, 10.0);

// ── Colour ──

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn to_u8(&self) -> (u8, u8, u8) {
        (
            CHANNEL.clamp(self.r).round() as u8,
            CHANNEL.clamp(self.g).round() as u8,
            CHANNEL.clamp(self.b).round() as u8,
        )
    }
}

pub const FACE_COLOR: Rgb = Rgb::new(255.0, 145.0, 145.0);
pub const FACE_COLOR_WORKING: Rgb = Rgb::new(255.0, 160.0, 130.0);
pub const FACE_COLOR_ERROR: Rgb = Rgb::new(255.0, 100.0, 100.0);

// ── Face parameters ──

/// Every independently animatable scalar of the face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceParameters {
    /// 0 = closed, 1 = open
    pub eye_open: f32,
    pub eye_scale: f32,
    /// Pupil offset, -1..1 on both axes
    pub pupil_x: f32,
    pub pupil_y: f32,
    pub pupil_scale: f32,
    /// -1 = lowered (angry), 1 = raised (surprised)
    pub brow_left_y: f32,
    pub brow_right_y: f32,
    pub brow_left_angle: f32,
    pub brow_right_angle: f32,
    pub mouth_open: f32,
    pub mouth_width: f32,
    /// -1 = sad, 0 = neutral, 1 = smile
    pub mouth_curve: f32,
    pub color: Rgb,
    pub blush: f32,
    pub shake: f32,
}

impl Default for FaceParameters {
    fn default() -> Self {
        Self {
            eye_open: 1.0,
            eye_scale: 1.0,
            pupil_x: 0.0,
            pupil_y: 0.0,
            pupil_scale: 0.5,
            brow_left_y: 0.0,
            brow_right_y: 0.0,
            brow_left_angle: 0.0,
            brow_right_angle: 0.0,
            mouth_open: 0.0,
            mouth_width: 0.6,
            mouth_curve: 0.0,
            color: FACE_COLOR,
            blush: 0.0,
            shake: 0.0,
        }
    }
}

fn approach(live: &mut f32, target: f32, t: f32) {
    *live += (target - *live) * t;
}

impl FaceParameters {
    /// Move every field toward `target` by fraction `t` (already clamped to 0..1).
    pub fn blend_toward(&mut self, target: &FaceParameters, t: f32) {
        approach(&mut self.eye_open, target.eye_open, t);
        approach(&mut self.eye_scale, target.eye_scale, t);
        approach(&mut self.pupil_x, target.pupil_x, t);
        approach(&mut self.pupil_y, target.pupil_y, t);
        approach(&mut self.pupil_scale, target.pupil_scale, t);
        approach(&mut self.brow_left_y, target.brow_left_y, t);
        approach(&mut self.brow_right_y, target.brow_right_y, t);
        approach(&mut self.brow_left_angle, target.brow_left_angle, t);
        approach(&mut self.brow_right_angle, target.brow_right_angle, t);
        approach(&mut self.mouth_open, target.mouth_open, t);
        approach(&mut self.mouth_width, target.mouth_width, t);
        approach(&mut self.mouth_curve, target.mouth_curve, t);
        approach(&mut self.color.r, target.color.r, t);
        approach(&mut self.color.g, target.color.g, t);
        approach(&mut self.color.b, target.color.b, t);
        approach(&mut self.blush, target.blush, t);
        approach(&mut self.shake, target.shake, t);
    }

    /// Pull every field back into its documented range.
    pub fn clamp(&mut self) {
        self.eye_open = UNIT.clamp(self.eye_open);
        self.eye_scale = EYE_SCALE.clamp(self.eye_scale);
        self.pupil_x = SIGNED.clamp(self.pupil_x);
        self.pupil_y = SIGNED.clamp(self.pupil_y);
        self.pupil_scale = UNIT.clamp(self.pupil_scale);
        self.brow_left_y = SIGNED.clamp(self.brow_left_y);
        self.brow_right_y = SIGNED.clamp(self.brow_right_y);
        self.brow_left_angle = BROW_ANGLE.clamp(self.brow_left_angle);
        self.brow_right_angle = BROW_ANGLE.clamp(self.brow_right_angle);
        self.mouth_open = UNIT.clamp(self.mouth_open);
        self.mouth_width = MOUTH_WIDTH.clamp(self.mouth_width);
        self.mouth_curve = SIGNED.clamp(self.mouth_curve);
        self.color.r = CHANNEL.clamp(self.color.r);
        self.color.g = CHANNEL.clamp(self.color.g);
        self.color.b = CHANNEL.clamp(self.color.b);
        self.blush = UNIT.clamp(self.blush);
        self.shake = SHAKE.clamp(self.shake);
    }

    /// Name of the first field holding NaN or infinity, if any.
    pub fn first_non_finite(&self) -> Option<&'static str> {
        let fields: [(&'static str, f32); 17] = [
            ("eye_open", self.eye_open),
            ("eye_scale", self.eye_scale),
            ("pupil_x", self.pupil_x),
            ("pupil_y", self.pupil_y),
            ("pupil_scale", self.pupil_scale),
            ("brow_left_y", self.brow_left_y),
            ("brow_right_y", self.brow_right_y),
            ("brow_left_angle", self.brow_left_angle),
            ("brow_right_angle", self.brow_right_angle),
            ("mouth_open", self.mouth_open),
            ("mouth_width", self.mouth_width),
            ("mouth_curve", self.mouth_curve),
            ("color.r", self.color.r),
            ("color.g", self.color.g),
            ("color.b", self.color.b),
            ("blush", self.blush),
            ("shake", self.shake),
        ];
        fields
            .iter()
            .find(|(_, v)| !v.is_finite())
            .map(|(name, _)| *name)
    }
}

// ── Renderer snapshot ──

/// Read-only view of the engine, sampled once per tick for drawing.
#[derive(Debug, Clone)]
pub struct FaceSnapshot {
    pub expression: String,
    pub params: FaceParameters,
    /// Vertical floating offset in canvas pixels
    pub float_y: f32,
    pub particles: Vec<Particle>,
    pub fps: u32,
    pub tick: u64,
    pub canvas_width: f32,
    pub canvas_height: f32,
}

// ── Acknowledgement datagram ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub status: String,
    /// Expression active after the command was applied
    pub state: String,
    /// The command's own expression field, or "unknown"
    pub command: String,
    /// Unix seconds
    pub timestamp: f64,
}

pub const ACK_SENTINEL: &str = "unknown";

impl Ack {
    pub fn new(state: &str, command: Option<&str>) -> Self {
        Self {
            status: "ok".to_string(),
            state: state.to_string(),
            command: command.unwrap_or(ACK_SENTINEL).to_string(),
            timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        }
    }
}

// ── Event payloads ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    Command,
    Wake,
    SleepTimeout,
    AutoRevert,
}

impl std::fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionReason::Command => write!(f, "command"),
            TransitionReason::Wake => write!(f, "wake"),
            TransitionReason::SleepTimeout => write!(f, "sleep timeout"),
            TransitionReason::AutoRevert => write!(f, "auto revert"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionData {
    pub from: String,
    pub to: String,
    pub reason: TransitionReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedData {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickFailedData {
    pub tick: u64,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateData {
    pub fps: u32,
}
