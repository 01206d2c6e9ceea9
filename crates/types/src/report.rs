//! Phase results, run reports, and the per-invocation state machine

use kiln_errors::{Error, RunError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The two lifecycle phases of a recipe, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    Build,
    Install,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseKind::Build => write!(f, "build"),
            PhaseKind::Install => write!(f, "install"),
        }
    }
}

/// Outcome of one executed phase. Immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: PhaseKind,
    /// Exit code of the first failing sub-step, or 0 when all succeeded.
    /// -1 when the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl PhaseResult {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The fetched and verified source artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub url: String,
    pub size: u64,
    /// Hex digest, prefixed with its algorithm (e.g. `sha256:...`)
    pub digest: String,
}

/// Per-invocation lifecycle states.
///
/// `Done` and `Failed` are terminal; every other state may fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Fetching,
    Verifying,
    Staged,
    Building,
    Installing,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Pending => "pending",
            RunState::Fetching => "fetching",
            RunState::Verifying => "verifying",
            RunState::Staged => "staged",
            RunState::Building => "building",
            RunState::Installing => "installing",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

impl RunState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    /// Validate and perform a state transition
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` when the move is not part of the
    /// lifecycle (states advance strictly forward; any non-terminal state
    /// may transition to `Failed`).
    pub fn transition(self, to: RunState) -> Result<RunState, Error> {
        let legal = match (self, to) {
            (RunState::Pending, RunState::Fetching)
            | (RunState::Fetching, RunState::Verifying)
            | (RunState::Verifying, RunState::Staged)
            | (RunState::Staged, RunState::Building)
            | (RunState::Building, RunState::Installing)
            | (RunState::Installing, RunState::Done) => true,
            (from, RunState::Failed) => !from.is_terminal(),
            _ => false,
        };
        if legal {
            Ok(to)
        } else {
            Err(RunError::InvalidTransition {
                from: self.to_string(),
                to: to.to_string(),
            }
            .into())
        }
    }
}

/// What went wrong, in presentation-ready form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureInfo {
    pub message: String,
    /// Process exit code for this failure class
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub retryable: bool,
}

/// Final report of one recipe invocation, consumed by the presentation
/// layer only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub name: String,
    pub version: String,
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactInfo>,
    /// Phase results in execution order
    pub phases: Vec<PhaseResult>,
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
    /// Build root left on disk for inspection, when retained
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retained_build_root: Option<std::path::PathBuf>,
}

impl RunReport {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Done
    }

    /// First failing phase, if any
    #[must_use]
    pub fn failed_phase(&self) -> Option<&PhaseResult> {
        self.phases.iter().find(|p| !p.success())
    }
}
