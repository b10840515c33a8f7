// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Stevedore CLI
//!
//! The `stevedore` binary drives a multi-container project described by a
//! YAML manifest against the local Docker engine.
//!
//! ## Commands
//!
//! - `stevedore up|create|start|stop|pause|unpause|kill|rm [SERVICE...]` - Lifecycle
//! - `stevedore scale SERVICE=COUNT...` - Change container counts
//! - `stevedore ps|provision|down` - Inspect, prepare and tear down the project
//! - `stevedore config show|validate|generate` - Configuration management
//!
//! Ctrl-C cancels the running operation: services already in flight finish,
//! the rest are reported as cancelled.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use stevedore_cli::commands::{
    self, ConfigCommand, CreateArgs, DownArgs, KillArgs, ProjectSource, PsArgs, ScaleArgs,
    ServiceArgs, StopArgs, UpArgs,
};

/// Stevedore - Run multi-container projects on Docker
#[derive(Parser)]
#[command(name = "stevedore")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project manifest
    #[arg(
        short,
        long,
        global = true,
        env = "STEVEDORE_FILE",
        default_value = "stevedore.yaml",
        value_name = "FILE"
    )]
    file: PathBuf,

    /// Project name (default: manifest `name`, else its directory name)
    #[arg(short, long, global = true, env = "STEVEDORE_PROJECT_NAME")]
    project_name: Option<String>,

    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "STEVEDORE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "STEVEDORE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and start containers, dependencies first
    Up(UpArgs),

    /// Create containers without starting them
    Create(CreateArgs),

    /// Start existing containers
    Start(ServiceArgs),

    /// Stop running containers, dependents first
    Stop(StopArgs),

    /// Pause running containers
    Pause(ServiceArgs),

    /// Unpause paused containers
    Unpause(ServiceArgs),

    /// Send a signal to running containers
    Kill(KillArgs),

    /// Remove stopped containers
    Rm(ServiceArgs),

    /// Set the number of containers for services
    ///
    /// The count holds for this invocation only. A later `stevedore up`
    /// keeps however many containers exist, or the manifest's `scale` when
    /// there are none, so `scale web=0` followed by `up` brings web back.
    Scale(ScaleArgs),

    /// List the project's containers
    Ps(PsArgs),

    /// Create the project's volumes and networks
    Provision,

    /// Stop and remove containers, networks and optionally volumes
    Down(DownArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level)?;

    let source = ProjectSource {
        file: cli.file,
        project_name: cli.project_name,
        config: cli.config,
    };

    match cli.command {
        Commands::Up(args) => commands::lifecycle::up(args, &source).await,
        Commands::Create(args) => commands::lifecycle::create(args, &source).await,
        Commands::Start(args) => commands::lifecycle::start(args, &source).await,
        Commands::Stop(args) => commands::lifecycle::stop(args, &source).await,
        Commands::Pause(args) => commands::lifecycle::pause(args, &source).await,
        Commands::Unpause(args) => commands::lifecycle::unpause(args, &source).await,
        Commands::Kill(args) => commands::lifecycle::kill(args, &source).await,
        Commands::Rm(args) => commands::lifecycle::rm(args, &source).await,
        Commands::Scale(args) => commands::lifecycle::scale(args, &source).await,
        Commands::Ps(args) => commands::status::ps(args, &source).await,
        Commands::Provision => commands::status::provision(&source).await,
        Commands::Down(args) => commands::lifecycle::down(args, &source).await,
        Commands::Config { command } => commands::config::handle_command(command, &source).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
