//! Procedural motion that runs after the blend step: blinking, pupil
//! tracking, speech-driven mouth, micro-saccades. Every timer here counts
//! down in seconds of `dt`, so tick-rate changes do not disturb them.

use rand::Rng;

use crate::expression::{Expression, PupilMode};
use crate::face::FaceState;

/// Chance per tick to start a blink once the cooldown has elapsed.
pub const BLINK_CHANCE: f32 = 0.015;
pub const BLINK_DURATION: f32 = 0.15;
/// Live eye openness held during a blink.
pub const BLINK_EYE_OPEN: f32 = 0.1;
const BLINK_COOLDOWN: (f32, f32) = (3.0, 6.0);

/// Synthetic mouth re-roll interval while speaking without amplitude.
pub const SPEECH_JITTER_PERIOD: f32 = 1.0 / 6.0;
const SPEECH_JITTER_RANGE: (f32, f32) = (0.2, 0.7);

const SACCADE_INTERVAL: (f32, f32) = (0.3, 0.8);
const SACCADE_REACH_X: f32 = 0.15;
const SACCADE_REACH_Y: f32 = 0.1;

/// Inputs the motion step reads but does not own.
#[derive(Debug, Clone, Copy)]
pub struct MotionInput<'a> {
    pub expression: &'a Expression,
    pub speech_amplitude: f32,
    /// Pointer in canvas pixels
    pub pointer: Option<(f32, f32)>,
    /// Face centre in canvas pixels
    pub center: (f32, f32),
    pub pointer_range: f32,
    pub saccade_distance: f32,
    /// Seconds of animated time, for oscillations
    pub elapsed: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Motion {
    blink_cooldown: f32,
    blink_remaining: f32,
    jitter_timer: f32,
    saccade_timer: f32,
    saccade: (f32, f32),
}

impl Motion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_blinking(&self) -> bool {
        self.blink_remaining > 0.0
    }

    pub fn update<R: Rng>(&mut self, face: &mut FaceState, input: &MotionInput, rng: &mut R, dt: f32) {
        let expr = input.expression;

        if expr.blinks {
            self.blink(face, rng, dt);
        } else {
            self.blink_remaining = 0.0;
        }

        if expr.speaks {
            self.speak(face, input.speech_amplitude, rng, dt);
        }

        match expr.pupils {
            PupilMode::Track => self.track(face, input, rng, dt),
            PupilMode::Wander => {
                let target = face.target_mut();
                target.pupil_x = (input.elapsed * 0.6).sin() * 0.1;
                target.pupil_y = 0.1 + (input.elapsed * 0.45).sin() * 0.05;
            }
            PupilMode::Fixed => {}
        }

        face.clamp();
    }

    fn blink<R: Rng>(&mut self, face: &mut FaceState, rng: &mut R, dt: f32) {
        self.blink_cooldown -= dt;
        if self.blink_cooldown <= 0.0 && rng.gen::<f32>() < BLINK_CHANCE {
            self.blink_remaining = BLINK_DURATION;
            self.blink_cooldown = rng.gen_range(BLINK_COOLDOWN.0..BLINK_COOLDOWN.1);
        }
        if self.blink_remaining > 0.0 {
            self.blink_remaining -= dt;
            face.live_mut().eye_open = BLINK_EYE_OPEN;
        }
    }

    fn speak<R: Rng>(&mut self, face: &mut FaceState, amplitude: f32, rng: &mut R, dt: f32) {
        if amplitude > 0.0 {
            // External amplitude overrides the synthetic jitter.
            face.live_mut().mouth_open = 0.2 + amplitude * 0.6;
            return;
        }
        self.jitter_timer -= dt;
        if self.jitter_timer <= 0.0 {
            face.target_mut().mouth_open = rng.gen_range(SPEECH_JITTER_RANGE.0..SPEECH_JITTER_RANGE.1);
            self.jitter_timer = SPEECH_JITTER_PERIOD;
        }
    }

    fn track<R: Rng>(&mut self, face: &mut FaceState, input: &MotionInput, rng: &mut R, dt: f32) {
        let Some((px, py)) = input.pointer else {
            // Nothing to look at yet: gaze straight ahead.
            self.saccade = (0.0, 0.0);
            let target = face.target_mut();
            target.pupil_x = 0.0;
            target.pupil_y = 0.0;
            return;
        };
        let dx = px - input.center.0;
        let dy = py - input.center.1;
        let range = input.pointer_range.max(1.0);

        if (dx * dx + dy * dy).sqrt() > input.saccade_distance {
            self.saccade_timer -= dt;
            if self.saccade_timer <= 0.0 {
                self.saccade = (
                    rng.gen_range(-SACCADE_REACH_X..SACCADE_REACH_X),
                    rng.gen_range(-SACCADE_REACH_Y..SACCADE_REACH_Y),
                );
                self.saccade_timer = rng.gen_range(SACCADE_INTERVAL.0..SACCADE_INTERVAL.1);
            }
        } else {
            self.saccade = (0.0, 0.0);
            self.saccade_timer = 0.0;
        }

        let target = face.target_mut();
        target.pupil_x = (dx / range).clamp(-1.0, 1.0) + self.saccade.0;
        target.pupil_y = (dy / range).clamp(-1.0, 1.0) + self.saccade.1;
    }
}
