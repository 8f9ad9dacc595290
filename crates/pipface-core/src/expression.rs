//! Expression table: the static set of named face presets.
//!
//! A preset lists target values for some or all face parameters. Fields left
//! as `None` keep whatever target was active before the preset was applied;
//! the pointer-tracking presets use this to leave pupils to the tracker.

use crate::error::EngineError;
use crate::particles::ParticleKind;
use crate::types::{FaceParameters, Rgb, FACE_COLOR_ERROR, FACE_COLOR_WORKING};

pub const IDLE: &str = "idle";
pub const SLEEPING: &str = "sleeping";

/// Partial parameter vector. Assignment is field by field over the fixed schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialParameters {
    pub eye_open: Option<f32>,
    pub eye_scale: Option<f32>,
    pub pupil_x: Option<f32>,
    pub pupil_y: Option<f32>,
    pub pupil_scale: Option<f32>,
    pub brow_left_y: Option<f32>,
    pub brow_right_y: Option<f32>,
    pub brow_left_angle: Option<f32>,
    pub brow_right_angle: Option<f32>,
    pub mouth_open: Option<f32>,
    pub mouth_width: Option<f32>,
    pub mouth_curve: Option<f32>,
    pub color: Option<Rgb>,
    pub blush: Option<f32>,
    pub shake: Option<f32>,
}

fn set(slot: &mut f32, value: Option<f32>) {
    if let Some(v) = value {
        *slot = v;
    }
}

impl PartialParameters {
    /// Every field specified, at the neutral defaults.
    pub fn full() -> Self {
        let d = FaceParameters::default();
        Self {
            eye_open: Some(d.eye_open),
            eye_scale: Some(d.eye_scale),
            pupil_x: Some(d.pupil_x),
            pupil_y: Some(d.pupil_y),
            pupil_scale: Some(d.pupil_scale),
            brow_left_y: Some(d.brow_left_y),
            brow_right_y: Some(d.brow_right_y),
            brow_left_angle: Some(d.brow_left_angle),
            brow_right_angle: Some(d.brow_right_angle),
            mouth_open: Some(d.mouth_open),
            mouth_width: Some(d.mouth_width),
            mouth_curve: Some(d.mouth_curve),
            color: Some(d.color),
            blush: Some(d.blush),
            shake: Some(d.shake),
        }
    }

    /// Overwrite the specified fields of `target`, leaving the rest alone.
    pub fn apply_to(&self, target: &mut FaceParameters) {
        set(&mut target.eye_open, self.eye_open);
        set(&mut target.eye_scale, self.eye_scale);
        set(&mut target.pupil_x, self.pupil_x);
        set(&mut target.pupil_y, self.pupil_y);
        set(&mut target.pupil_scale, self.pupil_scale);
        set(&mut target.brow_left_y, self.brow_left_y);
        set(&mut target.brow_right_y, self.brow_right_y);
        set(&mut target.brow_left_angle, self.brow_left_angle);
        set(&mut target.brow_right_angle, self.brow_right_angle);
        set(&mut target.mouth_open, self.mouth_open);
        set(&mut target.mouth_width, self.mouth_width);
        set(&mut target.mouth_curve, self.mouth_curve);
        if let Some(c) = self.color {
            target.color = c;
        }
        set(&mut target.blush, self.blush);
        set(&mut target.shake, self.shake);
        target.clamp();
    }
}

/// How pupils move while an expression is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PupilMode {
    /// Preset (or previous) target only.
    Fixed,
    /// Follow the pointer, with micro-saccades when it is far away.
    Track,
    /// Slow focused oscillation around the centre.
    Wander,
}

/// Persistent vertical bob: `sin(t * frequency) * amplitude`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatMotion {
    /// Canvas pixels
    pub amplitude: f32,
    /// Radians per second
    pub frequency: f32,
}

impl FloatMotion {
    pub fn offset(&self, elapsed: f32) -> f32 {
        (elapsed * self.frequency).sin() * self.amplitude
    }
}

/// Automatic emission while the expression is active.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoParticles {
    pub kind: ParticleKind,
    /// Seconds between bursts
    pub cooldown: f32,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub name: &'static str,
    pub params: PartialParameters,
    /// Runs at the reduced tick rate.
    pub low_activity: bool,
    /// Automatic blinking allowed (false for fixed eye shapes).
    pub blinks: bool,
    /// Mouth driven by speech amplitude or synthetic jitter.
    pub speaks: bool,
    pub pupils: PupilMode,
    pub float: FloatMotion,
    pub particles: Option<AutoParticles>,
}

const DEFAULT_FLOAT: FloatMotion = FloatMotion {
    amplitude: 4.0,
    frequency: 1.2,
};

impl Expression {
    pub fn new(name: &'static str, params: PartialParameters) -> Self {
        Self {
            name,
            params,
            low_activity: false,
            blinks: true,
            speaks: false,
            pupils: PupilMode::Fixed,
            float: DEFAULT_FLOAT,
            particles: None,
        }
    }
}

/// Read-only lookup of presets by name.
#[derive(Debug, Clone)]
pub struct ExpressionTable {
    expressions: Vec<Expression>,
}

impl ExpressionTable {
    /// Build a table. It must define both `idle` and `sleeping`.
    pub fn new(expressions: Vec<Expression>) -> Result<Self, EngineError> {
        for base in [IDLE, SLEEPING] {
            if !expressions.iter().any(|e| e.name == base) {
                return Err(EngineError::MissingBaseExpression(base));
            }
        }
        Ok(Self { expressions })
    }

    pub fn lookup(&self, name: &str) -> Result<&Expression, EngineError> {
        self.expressions
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| EngineError::UnknownExpression(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.expressions.iter().any(|e| e.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.expressions.iter().map(|e| e.name)
    }

    pub fn builtin() -> Self {
        Self {
            expressions: builtin_expressions(),
        }
    }
}

impl Default for ExpressionTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn tracked(params: PartialParameters) -> PartialParameters {
    PartialParameters {
        pupil_x: None,
        pupil_y: None,
        ..params
    }
}

fn builtin_expressions() -> Vec<Expression> {
    let full = PartialParameters::full;
    vec![
        Expression {
            low_activity: true,
            pupils: PupilMode::Track,
            float: FloatMotion {
                amplitude: 4.0,
                frequency: 0.8,
            },
            ..Expression::new(
                IDLE,
                tracked(PartialParameters {
                    mouth_curve: Some(0.1),
                    ..full()
                }),
            )
        },
        Expression {
            low_activity: true,
            blinks: false,
            float: FloatMotion {
                amplitude: 12.0,
                frequency: 0.4,
            },
            particles: Some(AutoParticles {
                kind: ParticleKind::Zzz,
                cooldown: 2.5,
                count: 1,
            }),
            ..Expression::new(
                SLEEPING,
                PartialParameters {
                    eye_open: Some(0.0),
                    brow_left_y: Some(-0.2),
                    brow_right_y: Some(-0.2),
                    ..full()
                },
            )
        },
        Expression {
            speaks: true,
            pupils: PupilMode::Track,
            float: FloatMotion {
                amplitude: 6.0,
                frequency: 2.4,
            },
            ..Expression::new(
                "speaking",
                tracked(PartialParameters {
                    mouth_curve: Some(0.2),
                    mouth_open: Some(0.3),
                    brow_left_y: Some(0.1),
                    brow_right_y: Some(0.1),
                    ..full()
                }),
            )
        },
        Expression {
            particles: Some(AutoParticles {
                kind: ParticleKind::Bubble,
                cooldown: 0.5,
                count: 3,
            }),
            ..Expression::new(
                "thinking",
                PartialParameters {
                    eye_open: Some(0.9),
                    pupil_x: Some(0.5),
                    pupil_y: Some(-0.3),
                    brow_left_y: Some(0.3),
                    brow_left_angle: Some(10.0),
                    ..full()
                },
            )
        },
        Expression {
            pupils: PupilMode::Wander,
            float: FloatMotion {
                amplitude: 3.0,
                frequency: 0.9,
            },
            ..Expression::new(
                "working",
                PartialParameters {
                    pupil_y: Some(0.1),
                    brow_left_y: Some(0.1),
                    brow_right_y: Some(0.1),
                    color: Some(FACE_COLOR_WORKING),
                    ..full()
                },
            )
        },
        Expression::new(
            "surprised",
            PartialParameters {
                eye_scale: Some(1.3),
                mouth_open: Some(0.8),
                brow_left_y: Some(0.6),
                brow_right_y: Some(0.6),
                pupil_scale: Some(0.3),
                shake: Some(5.0),
                ..full()
            },
        ),
        Expression::new(
            "confused",
            PartialParameters {
                mouth_curve: Some(-0.2),
                mouth_open: Some(0.1),
                pupil_x: Some(0.3),
                pupil_y: Some(0.2),
                brow_left_y: Some(0.4),
                brow_right_y: Some(-0.1),
                brow_left_angle: Some(15.0),
                brow_right_angle: Some(-5.0),
                ..full()
            },
        ),
        Expression {
            blinks: false,
            ..Expression::new(
                "happy",
                PartialParameters {
                    eye_open: Some(0.3),
                    mouth_curve: Some(0.8),
                    mouth_open: Some(0.2),
                    mouth_width: Some(0.8),
                    brow_left_y: Some(0.2),
                    brow_right_y: Some(0.2),
                    blush: Some(0.8),
                    ..full()
                },
            )
        },
        Expression {
            blinks: false,
            ..Expression::new(
                "error",
                PartialParameters {
                    eye_open: Some(0.0),
                    mouth_curve: Some(-0.5),
                    brow_left_y: Some(-0.3),
                    brow_right_y: Some(-0.3),
                    brow_left_angle: Some(-20.0),
                    brow_right_angle: Some(20.0),
                    color: Some(FACE_COLOR_ERROR),
                    shake: Some(3.0),
                    ..full()
                },
            )
        },
    ]
}
