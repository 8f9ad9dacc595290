//! Engine error taxonomy. Nothing here is fatal to the process.

/// Errors raised inside the engine. Callers log them and carry on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("unknown expression: {0}")]
    UnknownExpression(String),

    #[error("expression table is missing the base state '{0}'")]
    MissingBaseExpression(&'static str),

    #[error("tick produced a non-finite value in {field}")]
    NonFiniteTick { field: &'static str },

    #[error("tick panicked")]
    TickPanicked,
}
