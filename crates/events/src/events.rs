//! Domain-grouped event types

use kiln_types::RunState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application event enum that aggregates all domain-specific
/// events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// General utility events (warnings, errors, operations)
    General(GeneralEvent),

    /// Source artifact download and verification events
    Fetch(FetchEvent),

    /// Phase execution events (build, install)
    Phase(PhaseEvent),

    /// Per-invocation lifecycle events
    Run(RunEvent),
}

impl AppEvent {
    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            Self::General(GeneralEvent::Error { .. } | GeneralEvent::OperationFailed { .. })
            | Self::Fetch(FetchEvent::Failed { .. })
            | Self::Phase(PhaseEvent::Failed { .. })
            | Self::Run(RunEvent::Failed { .. }) => Level::ERROR,

            Self::General(GeneralEvent::Warning { .. }) => Level::WARN,

            Self::General(GeneralEvent::DebugLog { .. })
            | Self::Fetch(FetchEvent::Progress { .. })
            | Self::Run(RunEvent::StateChanged { .. }) => Level::DEBUG,

            _ => Level::INFO,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "kiln::events::general",
            Self::Fetch(_) => "kiln::events::fetch",
            Self::Phase(_) => "kiln::events::phase",
            Self::Run(_) => "kiln::events::run",
        }
    }
}

/// General utility events for warnings, errors, and operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeneralEvent {
    /// Generic warning message with optional context
    Warning {
        message: String,
        context: Option<String>,
    },

    /// Generic error message with optional details
    Error {
        message: String,
        details: Option<String>,
    },

    /// Debug logging
    DebugLog { message: String },

    /// Generic operation started notification
    OperationStarted { operation: String },

    /// Generic operation completion with success status
    OperationCompleted { operation: String, success: bool },

    /// Generic operation failure with error details
    OperationFailed { operation: String, error: String },
}

impl GeneralEvent {
    /// Create a warning event
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
            context: None,
        }
    }

    /// Create an error event
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            details: None,
        }
    }

    /// Create a debug log event
    pub fn debug(message: impl Into<String>) -> Self {
        Self::DebugLog {
            message: message.into(),
        }
    }
}

/// Source artifact fetch and verification events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FetchEvent {
    /// Download started
    Started { url: String, total_size: Option<u64> },

    /// Download progress update
    Progress {
        url: String,
        bytes_downloaded: u64,
        total_bytes: u64,
    },

    /// Checksum verification started
    Verifying { url: String, algorithm: String },

    /// Download completed and verified
    Completed {
        url: String,
        size: u64,
        digest: String,
    },

    /// Download or verification failed
    Failed { url: String, error: String },
}

/// Phase execution events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PhaseEvent {
    /// Phase started with its declared number of sub-steps
    Started { phase: String, steps: usize },

    /// One sub-step is about to run
    StepStarted {
        phase: String,
        index: usize,
        command: String,
    },

    /// Phase completed successfully
    Completed { phase: String, duration: Duration },

    /// Phase failed at the given sub-step
    Failed {
        phase: String,
        exit_code: i32,
        command: String,
    },
}

/// Per-invocation lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    /// The invocation moved to a new lifecycle state
    StateChanged {
        name: String,
        from: RunState,
        to: RunState,
    },

    /// Build root and destdir prepared
    Staged {
        name: String,
        build_root: PathBuf,
        destdir: PathBuf,
    },

    /// Build root left on disk for inspection
    BuildRootRetained { name: String, path: PathBuf },

    /// Whole invocation completed successfully
    Completed {
        name: String,
        version: String,
        duration: Duration,
    },

    /// Whole invocation failed
    Failed { name: String, error: String },
}
