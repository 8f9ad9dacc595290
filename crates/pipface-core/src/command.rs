//! Command datagram: JSON object with optional fields.
//!
//! `{"expression": "speaking", "amplitude": 0.5}`, `{"emotion": "happy",
//! "duration": 2}`, `{"particle": "heart", "count": 5}`. `state` is accepted
//! in place of `expression`; when both are present `expression` wins. Unknown
//! fields are ignored; a payload with no recognised field is rejected as empty.

use serde::{Deserialize, Serialize};

/// Particles per explicit emission request when `count` is absent.
pub const DEFAULT_PARTICLE_COUNT: u32 = 3;
/// Upper bound on a single request's `count`.
pub const MAX_PARTICLE_COUNT: u32 = 20;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,

    /// Older name for `expression`, folded into it on decode.
    #[serde(default, skip_serializing)]
    state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,

    /// Speech amplitude 0..1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amplitude: Option<f32>,

    /// Particle kind to emit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub particle: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,

    /// Seconds before reverting to idle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("payload is not UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not valid command JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no recognised fields")]
    Empty,

    #[error("bad argument '{0}', expected key=value")]
    BadArgument(String),
}

impl Command {
    pub fn expression(name: &str) -> Self {
        Self {
            expression: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn emotion(name: &str) -> Self {
        Self {
            emotion: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn particle(kind: &str) -> Self {
        Self {
            particle: Some(kind.to_string()),
            ..Self::default()
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = Some(amplitude);
        self
    }

    pub fn with_particle(mut self, kind: &str, count: Option<u32>) -> Self {
        self.particle = Some(kind.to_string());
        self.count = count;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.expression.is_none()
            && self.emotion.is_none()
            && self.amplitude.is_none()
            && self.particle.is_none()
            && self.count.is_none()
            && self.duration.is_none()
    }

    fn fold_state(mut self) -> Self {
        if let Some(state) = self.state.take() {
            self.expression.get_or_insert(state);
        }
        self
    }

    /// Emission count for the particle field, defaulted and capped.
    pub fn particle_count(&self) -> usize {
        self.count
            .unwrap_or(DEFAULT_PARTICLE_COUNT)
            .min(MAX_PARTICLE_COUNT) as usize
    }

    /// Decode one datagram.
    pub fn decode(bytes: &[u8]) -> Result<Self, CommandError> {
        let text = std::str::from_utf8(bytes)?;
        let value: serde_json::Value = serde_json::from_str(text.trim())?;
        if !value.is_object() {
            return Err(CommandError::NotAnObject);
        }
        let command = serde_json::from_value::<Command>(value)?.fold_state();
        if command.is_empty() {
            return Err(CommandError::Empty);
        }
        Ok(command)
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Build a command from `key=value` arguments. Values that parse as
    /// numbers are sent as numbers.
    pub fn from_key_values<S: AsRef<str>>(args: &[S]) -> Result<Self, CommandError> {
        let mut map = serde_json::Map::new();
        for arg in args {
            let arg = arg.as_ref();
            let (key, value) = arg
                .split_once('=')
                .ok_or_else(|| CommandError::BadArgument(arg.to_string()))?;
            let value = match value.parse::<f64>() {
                Ok(n) => serde_json::Number::from_f64(n)
                    .map(serde_json::Value::Number)
                    .unwrap_or_else(|| serde_json::Value::String(value.to_string())),
                Err(_) => serde_json::Value::String(value.to_string()),
            };
            map.insert(key.trim().to_string(), value);
        }
        // Integral counts arrive as floats from the parser above.
        if let Some(count) = map.get("count").and_then(|v| v.as_f64()) {
            map.insert("count".into(), serde_json::Value::from(count.max(0.0) as u64));
        }
        let command =
            serde_json::from_value::<Command>(serde_json::Value::Object(map))?.fold_state();
        if command.is_empty() {
            return Err(CommandError::Empty);
        }
        Ok(command)
    }
}
