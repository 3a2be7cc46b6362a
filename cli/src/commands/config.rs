// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use didflow_core::HarnessConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration with every default spelled out
    Generate {
        /// Output path (default: ./didflow-config.yaml)
        #[arg(short, long, default_value = "./didflow-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output } => generate(output).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. DIDFLOW_CONFIG_PATH: {}",
            std::env::var("DIDFLOW_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./didflow-config.yaml");
        println!("  4. ~/.didflow/config.yaml");
        println!("  5. /etc/didflow/config.yaml");
        println!();
    }

    let config = HarnessConfig::load_or_default(config_override).context("Failed to load configuration")?;

    println!("{}", "Current configuration:".bold());
    println!("  Profile: {}", config.metadata.name);
    println!("  Resource app: {}", config.spec.resource_app);
    println!();

    let services = &config.spec.services;
    println!("{}", "Services:".bold());
    for (name, url) in [
        ("authorisation", &services.authorisation),
        ("registry", &services.registry),
        ("timestamp", &services.timestamp),
        ("ledger", &services.ledger),
        ("notifications", &services.notifications),
        ("datahub", &services.datahub),
    ] {
        println!("  {:<14} {}", name, url);
    }
    println!();

    println!("{}", "Ledger:".bold());
    match config.spec.ledger.chain_id {
        Some(id) => println!("  Chain id fallback: {}", id),
        None => println!("  Chain id fallback: {}", "(none)".dimmed()),
    }
    println!(
        "  Receipt polling: every {} ms, at most {} attempts",
        config.spec.polling.interval_ms, config.spec.polling.max_attempts
    );
    println!();

    let timeouts = &config.spec.timeouts;
    println!("{}", "Timeouts:".bold());
    println!("  Challenge issuance: {} ms", timeouts.challenge_issuance_ms);
    println!("  JSON-RPC submission: {} ms", timeouts.jsonrpc_submission_ms);
    println!("  Receipt polling: {} ms", timeouts.receipt_polling_ms);
    println!("  Default: {} ms", timeouts.default_ms);
    println!("  Clock skew tolerance: {} s", config.spec.clock_skew_secs);

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = HarnessConfig::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf) -> Result<()> {
    HarnessConfig::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}
