// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # aegis-workflow CLI
//!
//! A thin command-line front end over `aegis-workflow-core`: the same
//! start/poll/complete-call/result embedding API (spec §6), plus `worker`
//! and `serve` to run the engine as a standalone service, and `migrate` to
//! apply the Postgres schema.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use aegis_workflow_core::config::OrchestratorConfig;

use aegis_workflow_cli::commands::{execution, migrate, serve, worker};

/// aegis-workflow - durable workflow orchestration engine
#[derive(Parser)]
#[command(name = "aegis-workflow")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a YAML configuration manifest. Omit to use defaults
    /// (in-memory store, local executor, bind 127.0.0.1:8000).
    #[arg(short, long, global = true, env = "AEGIS_WORKFLOW_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, env = "AEGIS_WORKFLOW_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new execution.
    Start(execution::StartArgs),
    /// Poll one execution, or every non-terminal execution.
    Poll(execution::PollArgs),
    /// Report a pending call's outcome.
    #[command(name = "complete-call")]
    CompleteCall(execution::CompleteCallArgs),
    /// Fetch a completed execution's result.
    Result(execution::ResultArgs),
    /// Run the steady-state worker loop in the foreground.
    Worker(worker::WorkerArgs),
    /// Run the HTTP embedding API (and webhook endpoint, if configured).
    Serve(serve::ServeArgs),
    /// Apply pending Postgres schema migrations.
    Migrate(migrate::MigrateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = match &cli.config {
        Some(path) => OrchestratorConfig::from_yaml_file(path)?,
        None => {
            info!("no --config given, using default configuration");
            OrchestratorConfig::default()
        }
    };

    match cli.command {
        Commands::Start(args) => execution::start(&config, args).await,
        Commands::Poll(args) => execution::poll(&config, args).await,
        Commands::CompleteCall(args) => execution::complete_call(&config, args).await,
        Commands::Result(args) => execution::result(&config, args).await,
        Commands::Worker(args) => worker::run(&config, args).await,
        Commands::Serve(args) => serve::run(&config, args).await,
        Commands::Migrate(args) => migrate::run(&config, args).await,
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
