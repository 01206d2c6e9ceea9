#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Error types for the kiln recipe runner
//!
//! This crate provides fine-grained error types organized by domain.
//! All error types implement Clone where possible for easier handling.

use thiserror::Error;

pub mod network;
pub mod recipe;
pub mod run;

// Re-export all error types at the root
pub use network::NetworkError;
pub use recipe::RecipeError;
pub use run::RunError;

/// Generic error type for cross-crate boundaries
#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("recipe error: {0}")]
    Recipe(#[from] RecipeError),

    #[error("run error: {0}")]
    Run(#[from] RunError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {message}")]
    Io {
        #[cfg_attr(feature = "serde", serde(with = "io_kind_as_str"))]
        kind: std::io::ErrorKind,
        message: String,
        #[cfg_attr(feature = "serde", serde(with = "opt_path_buf"))]
        path: Option<std::path::PathBuf>,
    },
}

impl Error {
    /// Create an internal error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an Io error with an associated path
    pub fn io_with_path(err: &std::io::Error, path: impl Into<std::path::PathBuf>) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: Some(path.into()),
        }
    }

    /// Process exit code for this failure class.
    ///
    /// Each class maps to a distinct non-zero code so callers can tell
    /// apart fetch, checksum, build and install failures without parsing
    /// messages.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Network(NetworkError::ChecksumMismatch { .. }) => 4,
            Error::Network(_) => 3,
            Error::Recipe(_) => 2,
            Error::Run(RunError::PhaseFailed { phase, .. }) if phase == "install" => 6,
            Error::Run(
                RunError::PhaseFailed { .. }
                | RunError::Timeout { .. }
                | RunError::SpawnFailed { .. }
                | RunError::CommandParse { .. },
            ) => 5,
            Error::Run(RunError::StageFailed { .. }) | Error::Io { .. } => 7,
            _ => 1,
        }
    }

    /// Optional remediation hint for CLI output.
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Error::Network(NetworkError::ChecksumMismatch { .. }) => Some(
                "The downloaded artifact does not match the declared checksum. \
                 Verify the source URL and checksum in the recipe.",
            ),
            Error::Network(_) => {
                Some("Check network access and the recipe's source URL, then retry.")
            }
            Error::Recipe(_) => Some("Correct the recipe file before retrying."),
            Error::Run(RunError::Timeout { .. }) => Some("Increase --timeout and retry."),
            Error::Run(RunError::PhaseFailed { .. }) => {
                Some("Inspect the retained build directory for the failing command's output.")
            }
            _ => None,
        }
    }

    /// Whether retrying the same invocation is likely to succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(
                NetworkError::Timeout { .. }
                    | NetworkError::ConnectionRefused(_)
                    | NetworkError::DownloadFailed(_)
                    | NetworkError::HttpError { .. }
            ) | Error::Io { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {err}"))
    }
}

/// Result type alias for kiln operations
pub type Result<T> = std::result::Result<T, Error>;

// Serde helper modules for optional path and io::ErrorKind as string
#[cfg(feature = "serde")]
mod io_kind_as_str {
    use serde::{Deserialize, Deserializer, Serializer};
    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S>(kind: &std::io::ErrorKind, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&format!("{kind:?}"))
    }
    pub fn deserialize<'de, D>(deserializer: D) -> Result<std::io::ErrorKind, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        // Best effort mapping; default to Other
        Ok(match s.as_str() {
            "NotFound" => std::io::ErrorKind::NotFound,
            "PermissionDenied" => std::io::ErrorKind::PermissionDenied,
            "ConnectionRefused" => std::io::ErrorKind::ConnectionRefused,
            "BrokenPipe" => std::io::ErrorKind::BrokenPipe,
            "AlreadyExists" => std::io::ErrorKind::AlreadyExists,
            "InvalidInput" => std::io::ErrorKind::InvalidInput,
            "InvalidData" => std::io::ErrorKind::InvalidData,
            "TimedOut" => std::io::ErrorKind::TimedOut,
            "Interrupted" => std::io::ErrorKind::Interrupted,
            "UnexpectedEof" => std::io::ErrorKind::UnexpectedEof,
            _ => std::io::ErrorKind::Other,
        })
    }
}

#[cfg(feature = "serde")]
mod opt_path_buf {
    use serde::{Deserialize, Deserializer, Serializer};
    #[allow(clippy::ref_option)]
    pub fn serialize<S>(path: &Option<std::path::PathBuf>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match path {
            Some(pb) => s.serialize_some(&pb.display().to_string()),
            None => s.serialize_none(),
        }
    }
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<std::path::PathBuf>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<String>::deserialize(deserializer)?;
        Ok(opt.map(std::path::PathBuf::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_failure_class() {
        let checksum: Error = NetworkError::ChecksumMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        }
        .into();
        let fetch: Error = NetworkError::DownloadFailed("boom".into()).into();
        let recipe: Error = RecipeError::MissingField {
            field: "name".into(),
        }
        .into();
        let build: Error = RunError::PhaseFailed {
            phase: "build".into(),
            exit_code: 2,
        }
        .into();
        let install: Error = RunError::PhaseFailed {
            phase: "install".into(),
            exit_code: 1,
        }
        .into();
        let staging: Error = RunError::StageFailed {
            message: "mkdir".into(),
        }
        .into();

        let codes = [
            checksum.exit_code(),
            fetch.exit_code(),
            recipe.exit_code(),
            build.exit_code(),
            install.exit_code(),
            staging.exit_code(),
        ];
        assert_eq!(codes, [4, 3, 2, 5, 6, 7]);
    }

    #[test]
    fn io_errors_convert_with_path() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error = Error::io_with_path(&err, "/tmp/x");
        match error {
            Error::Io { kind, path, .. } => {
                assert_eq!(kind, std::io::ErrorKind::NotFound);
                assert_eq!(path.unwrap(), std::path::PathBuf::from("/tmp/x"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
