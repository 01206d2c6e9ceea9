#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Recipe pipeline orchestration for kiln
//!
//! A run moves through a fixed lifecycle: fetch the source artifact,
//! verify its checksum, stage isolated directories, run the `build`
//! phase, run the `install` phase. Verification must succeed before any
//! directory is staged or any phase runs, and `install` never starts
//! unless `build` exited zero.

mod context;
mod executor;

pub use context::{BuildContext, Stager};
pub use executor::{expand_placeholders, run_phase, split_command};

use kiln_errors::{Error, NetworkError, RunError};
use kiln_events::{AppEvent, EventEmitter, EventSender, RunEvent};
use kiln_hash::Digest;
use kiln_net::{fetch_artifact, NetClient, NetConfig};
use kiln_types::{ArtifactInfo, FailureInfo, PhaseKind, PhaseResult, Recipe, RunReport, RunState};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Directory under which all per-invocation trees are created
    pub work_root: PathBuf,
    /// Override for the recipe's install prefix
    pub prefix_override: Option<String>,
    /// Whole-run timeout; `None` disables it
    pub timeout_seconds: Option<u64>,
    /// Keep the build root around even on success
    pub keep_build_dir: bool,
    /// Parallel job count exported as `JOBS`; defaults to the CPU count
    pub jobs: Option<usize>,
    /// HTTP client settings for the fetch step
    pub net: NetConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            work_root: std::env::temp_dir().join("kiln"),
            prefix_override: None,
            timeout_seconds: Some(3600),
            keep_build_dir: false,
            jobs: None,
            net: NetConfig::default(),
        }
    }
}

impl RunnerConfig {
    #[must_use]
    pub fn with_work_root(mut self, work_root: impl Into<PathBuf>) -> Self {
        self.work_root = work_root.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_keep_build_dir(mut self, keep: bool) -> Self {
        self.keep_build_dir = keep;
        self
    }

    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix_override = Some(prefix.into());
        self
    }
}

/// Stateless interpreter for recipes
pub struct Runner {
    config: RunnerConfig,
    net: NetClient,
}

impl Runner {
    /// Create a runner
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(config: RunnerConfig) -> Result<Self, Error> {
        let net = NetClient::new(config.net.clone())?;
        Ok(Self { config, net })
    }

    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run one recipe through the whole lifecycle.
    ///
    /// Always produces a report; failures are recorded in
    /// `RunReport::failure` together with the exit code for that failure
    /// class. Directory retention on completion:
    /// - success: released unless `keep_build_dir`
    /// - phase failure: retained for inspection
    /// - timeout or fetch/verify failure: released unless `keep_build_dir`
    pub async fn run(&self, recipe: &Recipe, tx: &EventSender) -> RunReport {
        let started = Instant::now();
        let mut state = RunState::Pending;
        let mut staged: Option<BuildContext> = None;
        let mut phases: Vec<PhaseResult> = Vec::new();
        let mut artifact: Option<ArtifactInfo> = None;

        let outcome = match self.config.timeout_seconds {
            Some(seconds) => {
                let pipeline = self.pipeline(
                    recipe,
                    tx,
                    &mut state,
                    &mut staged,
                    &mut phases,
                    &mut artifact,
                );
                match tokio::time::timeout(Duration::from_secs(seconds), pipeline).await {
                    Ok(result) => result,
                    Err(_) => Err(RunError::Timeout { seconds }.into()),
                }
            }
            None => {
                self.pipeline(
                    recipe,
                    tx,
                    &mut state,
                    &mut staged,
                    &mut phases,
                    &mut artifact,
                )
                .await
            }
        };

        let duration = started.elapsed();
        match outcome {
            Ok(()) => {
                let retained = self
                    .finish_directories(&mut staged, !self.config.keep_build_dir, recipe, tx)
                    .await;
                tx.emit(AppEvent::Run(RunEvent::Completed {
                    name: recipe.name.clone(),
                    version: recipe.version.clone(),
                    duration,
                }));
                RunReport {
                    name: recipe.name.clone(),
                    version: recipe.version.clone(),
                    state,
                    artifact,
                    phases,
                    duration,
                    failure: None,
                    retained_build_root: retained,
                }
            }
            Err(error) => {
                if let Ok(next) = state.transition(RunState::Failed) {
                    tx.emit(AppEvent::Run(RunEvent::StateChanged {
                        name: recipe.name.clone(),
                        from: state,
                        to: next,
                    }));
                    state = next;
                }

                // Phase failures keep the tree around for inspection;
                // everything else follows the keep_build_dir flag.
                let phase_failure = matches!(error, Error::Run(RunError::PhaseFailed { .. }));
                let release = !(phase_failure || self.config.keep_build_dir);
                let retained = self.finish_directories(&mut staged, release, recipe, tx).await;

                tx.emit(AppEvent::Run(RunEvent::Failed {
                    name: recipe.name.clone(),
                    error: error.to_string(),
                }));

                RunReport {
                    name: recipe.name.clone(),
                    version: recipe.version.clone(),
                    state,
                    artifact,
                    phases,
                    duration,
                    failure: Some(FailureInfo {
                        message: error.to_string(),
                        exit_code: error.exit_code(),
                        hint: error.hint().map(str::to_string),
                        retryable: error.is_retryable(),
                    }),
                    retained_build_root: retained,
                }
            }
        }
    }

    async fn pipeline(
        &self,
        recipe: &Recipe,
        tx: &EventSender,
        state: &mut RunState,
        staged: &mut Option<BuildContext>,
        phases: &mut Vec<PhaseResult>,
        artifact: &mut Option<ArtifactInfo>,
    ) -> Result<(), Error> {
        let digest = Digest::from_checksum(&recipe.checksum()?)?;

        *state = advance(*state, RunState::Fetching, &recipe.name, tx)?;

        tokio::fs::create_dir_all(&self.config.work_root)
            .await
            .map_err(|e| Error::io_with_path(&e, &self.config.work_root))?;

        // The artifact lands in its own scratch directory; nothing is
        // staged until it verifies.
        let scratch = tempfile::Builder::new()
            .prefix("fetch-")
            .tempdir_in(&self.config.work_root)
            .map_err(|e| Error::io_with_path(&e, &self.config.work_root))?;
        let artifact_path = scratch.path().join(artifact_file_name(&recipe.source));

        let downloaded =
            match fetch_artifact(&self.net, &recipe.source, &artifact_path, &digest, tx).await {
                Ok(result) => result,
                Err(error) => {
                    // A mismatch means the transfer itself completed
                    if matches!(error, Error::Network(NetworkError::ChecksumMismatch { .. })) {
                        *state = advance(*state, RunState::Verifying, &recipe.name, tx)?;
                    }
                    return Err(error);
                }
            };

        *state = advance(*state, RunState::Verifying, &recipe.name, tx)?;
        *artifact = Some(ArtifactInfo {
            url: downloaded.url,
            size: downloaded.size,
            digest: downloaded.digest.tagged(),
        });

        let stager = Stager::new(&self.config.work_root);
        let prefix = self
            .config
            .prefix_override
            .as_deref()
            .unwrap_or(&recipe.prefix);
        let jobs = self.config.jobs.unwrap_or_else(num_cpus::get);

        let mut context = stager.prepare(recipe, prefix, jobs).await?;
        context
            .env
            .insert("SOURCE".to_string(), artifact_path.display().to_string());

        tx.emit(AppEvent::Run(RunEvent::Staged {
            name: recipe.name.clone(),
            build_root: context.build_root.clone(),
            destdir: context.destdir.clone(),
        }));
        *state = advance(*state, RunState::Staged, &recipe.name, tx)?;

        *staged = Some(context);
        let Some(context) = staged.as_ref() else {
            return Err(Error::internal("build context vanished"));
        };

        *state = advance(*state, RunState::Building, &recipe.name, tx)?;
        let build = run_phase(context, PhaseKind::Build, recipe.phase(PhaseKind::Build), tx).await?;
        let build_code = build.exit_code;
        let build_ok = build.success();
        phases.push(build);
        if !build_ok {
            return Err(RunError::PhaseFailed {
                phase: PhaseKind::Build.to_string(),
                exit_code: build_code,
            }
            .into());
        }

        *state = advance(*state, RunState::Installing, &recipe.name, tx)?;
        let install = run_phase(
            context,
            PhaseKind::Install,
            recipe.phase(PhaseKind::Install),
            tx,
        )
        .await?;
        let install_code = install.exit_code;
        let install_ok = install.success();
        phases.push(install);
        if !install_ok {
            return Err(RunError::PhaseFailed {
                phase: PhaseKind::Install.to_string(),
                exit_code: install_code,
            }
            .into());
        }

        *state = advance(*state, RunState::Done, &recipe.name, tx)?;
        Ok(())
    }

    /// Release or retain the staged directories, reporting what was kept
    async fn finish_directories(
        &self,
        staged: &mut Option<BuildContext>,
        release: bool,
        recipe: &Recipe,
        tx: &EventSender,
    ) -> Option<PathBuf> {
        let context = staged.take()?;
        if release {
            if let Err(error) = context.release().await {
                tx.emit_warning(format!(
                    "failed to clean {}: {error}",
                    context.root().display()
                ));
            }
            None
        } else {
            let path = context.root().to_path_buf();
            tx.emit(AppEvent::Run(RunEvent::BuildRootRetained {
                name: recipe.name.clone(),
                path: path.clone(),
            }));
            Some(path)
        }
    }
}

/// Validate and perform a lifecycle transition, announcing it
fn advance(
    from: RunState,
    to: RunState,
    name: &str,
    tx: &EventSender,
) -> Result<RunState, Error> {
    let next = from.transition(to)?;
    tx.emit(AppEvent::Run(RunEvent::StateChanged {
        name: name.to_string(),
        from,
        to: next,
    }));
    Ok(next)
}

/// File name for the downloaded artifact, taken from the source URL
fn artifact_file_name(source: &str) -> String {
    kiln_net::parse_url(source)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "source".to_string())
}
