//! Command line interface definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// kiln - recipe runner for source-package builds
#[derive(Parser)]
#[command(name = "kiln")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Recipe runner for source-package builds")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Fetch, verify, build and stage-install recipes
    Run {
        /// Recipe files to run
        #[arg(required = true)]
        recipes: Vec<PathBuf>,

        /// Override the install prefix declared by the recipe
        #[arg(long, value_name = "PATH")]
        prefix: Option<String>,

        /// Keep the build directory after a successful run
        #[arg(long)]
        keep_build_dir: bool,

        /// Whole-run timeout in seconds
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,

        /// Directory for build roots and staging trees
        #[arg(long, value_name = "PATH")]
        work_dir: Option<PathBuf>,

        /// Parallel job count exported to builds
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Parse and validate recipes without running them
    #[command(alias = "check")]
    Validate {
        /// Recipe files to validate
        #[arg(required = true)]
        recipes: Vec<PathBuf>,
    },
}
