//! Face state: live and target parameter vectors and the blend between them.

use crate::expression::Expression;
use crate::types::FaceParameters;

/// Default exponential approach rate, per second.
pub const BLEND_RATE: f32 = 8.0;

#[derive(Debug, Clone, PartialEq)]
pub struct FaceState {
    live: FaceParameters,
    target: FaceParameters,
    rate: f32,
}

impl FaceState {
    /// Start at rest: live equals target.
    pub fn at_rest(params: FaceParameters, rate: f32) -> Self {
        let mut params = params;
        params.clamp();
        Self {
            live: params,
            target: params,
            rate,
        }
    }

    /// Replace the target with the expression's values. Fields the expression
    /// leaves unspecified keep their previous target.
    pub fn set_target(&mut self, expression: &Expression) {
        expression.params.apply_to(&mut self.target);
    }

    /// `live += (target - live) * min(1, rate * dt)` for every field,
    /// colour channel-wise with the same rule.
    pub fn tick(&mut self, dt: f32) {
        let t = (self.rate * dt).clamp(0.0, 1.0);
        self.live.blend_toward(&self.target, t);
        self.live.clamp();
    }

    pub fn live(&self) -> &FaceParameters {
        &self.live
    }

    pub fn target(&self) -> &FaceParameters {
        &self.target
    }

    /// Direct access for procedural motion (blinks, speech). Call
    /// [`FaceState::clamp`] after writing.
    pub fn live_mut(&mut self) -> &mut FaceParameters {
        &mut self.live
    }

    pub fn target_mut(&mut self) -> &mut FaceParameters {
        &mut self.target
    }

    pub fn clamp(&mut self) {
        self.live.clamp();
        self.target.clamp();
    }
}
