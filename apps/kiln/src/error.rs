//! CLI error handling

use std::fmt;

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Pipeline error
    Run(kiln_errors::Error),
    /// Configuration file error
    Config(String),
    /// Invalid command arguments
    InvalidArguments(String),
    /// Interrupted by the user
    Interrupted,
    /// Internal error (worker panic and the like)
    Internal(String),
    /// I/O error
    Io(std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Run(e) => e.exit_code(),
            CliError::Config(_) | CliError::InvalidArguments(_) => 2,
            CliError::Interrupted => 130,
            CliError::Internal(_) => 1,
            CliError::Io(_) => 7,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Run(e) => {
                write!(f, "{e}")?;
                if let Some(hint) = e.hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                if e.is_retryable() {
                    write!(f, "\n  Retry: safe to retry this operation.")?;
                }
                Ok(())
            }
            CliError::Config(msg) => write!(f, "Configuration error: {msg}"),
            CliError::InvalidArguments(msg) => write!(f, "Invalid arguments: {msg}"),
            CliError::Interrupted => write!(f, "Interrupted"),
            CliError::Internal(msg) => write!(f, "Internal error: {msg}"),
            CliError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Run(e) => Some(e),
            CliError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<kiln_errors::Error> for CliError {
    fn from(e: kiln_errors::Error) -> Self {
        CliError::Run(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Run(e.into())
    }
}
