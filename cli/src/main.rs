// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Corpus CLI
//!
//! The `corpus` binary runs requests through an embedded particle runtime
//! and inspects the state it leaves behind.
//!
//! ## Commands
//!
//! - `corpus submit <kind> [--params JSON] [--workspace DIR]` - Plan, dispatch and synthesize one request
//! - `corpus stats particle <id>|patterns` - Inspect persisted state
//! - `corpus config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use corpus_orchestrator::commands::{self, ConfigCommand, StatsCommand, SubmitArgs};

/// Corpus - particle orchestration runtime
#[derive(Parser)]
#[command(name = "corpus")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "CORPUS_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "CORPUS_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a request to an embedded runtime
    #[command(name = "submit")]
    Submit(SubmitArgs),

    /// Inspect persisted particle and pattern state
    #[command(name = "stats")]
    Stats {
        #[command(subcommand)]
        command: StatsCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Submit(args) => {
            let code = commands::submit::handle_command(args, cli.config).await?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Stats { command } => commands::stats::handle_command(command, cli.config).await,
        Commands::Config { command } => commands::config::handle_command(command, cli.config).await,
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
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
