// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # didflow
//!
//! The `didflow` binary drives command scripts against a decentralized-identity
//! network and reports which protocol properties held.
//!
//! ## Commands
//!
//! - `didflow run <FILE>... [--parallel]` - Execute scenario scripts
//! - `didflow exec <LINE>...` - Execute commands given on the command line
//! - `didflow config show|validate|generate` - Configuration management
//!
//! The process exits with status 1 when any scenario fails.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use didflow_cli::commands::{self, ConfigCommand};

/// didflow - protocol conformance flows for decentralized identity
#[derive(Parser)]
#[command(name = "didflow")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "DIDFLOW_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "DIDFLOW_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenario scripts
    #[command(name = "run")]
    Run {
        /// Script files, one scenario each
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Run the scenarios concurrently
        #[arg(long)]
        parallel: bool,
    },

    /// Execute commands as a single scenario
    #[command(name = "exec")]
    Exec {
        /// Command lines, executed in order
        #[arg(value_name = "LINE", required = true)]
        lines: Vec<String>,
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
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let passed = match cli.command {
        Some(Commands::Run { files, parallel }) => commands::run::run_files(files, parallel, cli.config).await?,
        Some(Commands::Exec { lines }) => commands::run::exec_lines(lines, cli.config).await?,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await?;
            true
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            false
        }
    };

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
