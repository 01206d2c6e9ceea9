//! Recipe parsing and validation error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RecipeError {
    #[error("recipe not found: {path}")]
    NotFound { path: String },

    #[error("parse error: {message}")]
    ParseError { message: String },

    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("invalid checksum: {message}")]
    InvalidChecksum { message: String },

    #[error("phase {phase} declares no commands")]
    EmptyPhase { phase: String },

    #[error("invalid prefix {prefix}: {reason}")]
    InvalidPrefix { prefix: String, reason: String },
}
