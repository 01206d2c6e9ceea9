//! kiln - recipe runner for source-package builds
//!
//! This is the CLI application: it loads recipes, drives the runner
//! pipelines, and turns the event stream into user-facing output.

mod cli;
mod config;
mod display;
mod error;
mod events;

use crate::cli::{Cli, Commands, GlobalArgs};
use crate::config::FileConfig;
use crate::display::OutputRenderer;
use crate::error::CliError;
use crate::events::EventHandler;
use clap::Parser;
use kiln_errors::RecipeError;
use kiln_events::EventReceiver;
use kiln_net::NetConfig;
use kiln_runner::{Runner, RunnerConfig};
use kiln_types::{Recipe, RunReport};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tokio::select;
use tokio::task::JoinSet;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments first to check for JSON mode
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    init_tracing(cli.global.debug);

    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("application error: {}", e);
            if !json_mode {
                eprintln!("Error: {e}");
            }
            process::exit(e.exit_code());
        }
    }
}

/// Main application logic
async fn run(cli: Cli) -> Result<i32, CliError> {
    info!("starting kiln v{}", env!("CARGO_PKG_VERSION"));

    // Config precedence: CLI flags > config file > defaults
    let file_config = FileConfig::load(cli.global.config.as_deref()).await?;

    match cli.command {
        Commands::Validate { recipes } => validate(&recipes, cli.global.json).await,

        Commands::Run {
            recipes,
            prefix,
            keep_build_dir,
            timeout,
            work_dir,
            jobs,
        } => {
            let runner_config = build_runner_config(
                &file_config,
                prefix,
                keep_build_dir,
                timeout,
                work_dir,
                jobs,
            );
            run_recipes(&recipes, runner_config, &cli.global).await
        }
    }
}

/// Parse recipes and report their identity without running anything
async fn validate(paths: &[PathBuf], json: bool) -> Result<i32, CliError> {
    for path in paths {
        let recipe = load_recipe(path).await?;
        if json {
            println!(
                "{}",
                serde_json::to_string(&serde_json::json!({
                    "recipe": path.display().to_string(),
                    "name": recipe.name,
                    "version": recipe.version,
                    "status": "ok",
                }))?
            );
        } else {
            println!("{}: {} {} ok", path.display(), recipe.name, recipe.version);
        }
    }
    Ok(0)
}

/// Run each recipe pipeline in its own task; directories never collide
/// because every invocation stages under a unique path.
async fn run_recipes(
    paths: &[PathBuf],
    runner_config: RunnerConfig,
    global: &GlobalArgs,
) -> Result<i32, CliError> {
    // Load everything up front so a bad recipe fails before any fetch
    let mut recipes = Vec::with_capacity(paths.len());
    for path in paths {
        recipes.push(load_recipe(path).await?);
    }

    let (tx, rx) = kiln_events::channel();
    let mut tasks: JoinSet<(usize, RunReport)> = JoinSet::new();
    for (index, recipe) in recipes.into_iter().enumerate() {
        let runner = Runner::new(runner_config.clone())?;
        let tx = tx.clone();
        tasks.spawn(async move { (index, runner.run(&recipe, &tx).await) });
    }
    drop(tx);

    let mut reports = drive_pipelines(tasks, rx, global).await?;
    reports.sort_by_key(|(index, _)| *index);

    let renderer = OutputRenderer::new(global.json);
    let mut exit = 0;
    for (_, report) in &reports {
        renderer.render_report(report)?;
        if exit == 0 {
            if let Some(failure) = &report.failure {
                exit = failure.exit_code;
            }
        }
    }
    Ok(exit)
}

/// Drive pipeline tasks while handling their events concurrently
async fn drive_pipelines(
    mut tasks: JoinSet<(usize, RunReport)>,
    mut rx: EventReceiver,
    global: &GlobalArgs,
) -> Result<Vec<(usize, RunReport)>, CliError> {
    let mut handler = EventHandler::new(!global.json, global.debug);
    let mut reports = Vec::new();
    let mut channel_open = true;

    loop {
        select! {
            joined = tasks.join_next() => {
                match joined {
                    Some(Ok(report)) => reports.push(report),
                    Some(Err(e)) => {
                        return Err(CliError::Internal(format!("pipeline task failed: {e}")));
                    }
                    None => {
                        // All pipelines done; drain whatever is left
                        while let Ok(event) = rx.try_recv() {
                            handler.handle_event(event);
                        }
                        return Ok(reports);
                    }
                }
            }

            event = rx.recv(), if channel_open => {
                match event {
                    Some(event) => handler.handle_event(event),
                    None => channel_open = false,
                }
            }

            _ = tokio::signal::ctrl_c() => {
                // Dropping the tasks terminates their subprocesses before
                // anything else happens
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                return Err(CliError::Interrupted);
            }
        }
    }
}

/// Load and validate a recipe file
async fn load_recipe(path: &Path) -> Result<Recipe, CliError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CliError::Run(
                RecipeError::NotFound {
                    path: path.display().to_string(),
                }
                .into(),
            )
        } else {
            CliError::Run(kiln_errors::Error::io_with_path(&e, path))
        }
    })?;
    Ok(Recipe::from_yaml(&text)?)
}

/// Merge config file settings under the CLI flags
fn build_runner_config(
    file: &FileConfig,
    prefix: Option<String>,
    keep_build_dir: bool,
    timeout: Option<u64>,
    work_dir: Option<PathBuf>,
    jobs: Option<usize>,
) -> RunnerConfig {
    let mut config = RunnerConfig::default();

    if let Some(dir) = &file.work_dir {
        config.work_root.clone_from(dir);
    }
    if let Some(seconds) = file.timeout_seconds {
        config.timeout_seconds = Some(seconds);
    }
    config.jobs = file.jobs;
    config.keep_build_dir = file.keep_build_dir.unwrap_or(false);

    let mut net = NetConfig::default();
    if let Some(count) = file.net.retry_count {
        net.retry_count = count;
    }
    if let Some(ms) = file.net.retry_delay_ms {
        net.retry_delay = Duration::from_millis(ms);
    }
    if let Some(seconds) = file.net.timeout_seconds {
        net.timeout = Duration::from_secs(seconds);
    }
    config.net = net;

    // CLI flags win
    if let Some(dir) = work_dir {
        config.work_root = dir;
    }
    if let Some(seconds) = timeout {
        config.timeout_seconds = Some(seconds);
    }
    if let Some(jobs) = jobs {
        config.jobs = Some(jobs);
    }
    if keep_build_dir {
        config.keep_build_dir = true;
    }
    config.prefix_override = prefix;

    config
}

/// Initialize tracing/logging
fn init_tracing(debug_enabled: bool) {
    let default_filter = if debug_enabled {
        "info,kiln=debug"
    } else {
        "warn,kiln=warn"
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();
}
