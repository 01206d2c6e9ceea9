//! Pipeline and phase-execution error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum RunError {
    #[error("phase {phase} failed with exit code {exit_code}")]
    PhaseFailed { phase: String, exit_code: i32 },

    #[error("staging failed: {message}")]
    StageFailed { message: String },

    #[error("command parsing failed: {command} - {reason}")]
    CommandParse { command: String, reason: String },

    #[error("failed to spawn {command}: {message}")]
    SpawnFailed { command: String, message: String },

    #[error("run timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}
