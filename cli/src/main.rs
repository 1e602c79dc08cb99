// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # sqtpm-deploy
//!
//! Deploys assignments and their password files into the SQTPM grading
//! container. Every invocation adds to what earlier invocations deployed:
//!
//! - `sqtpm-deploy hw1,hw2:users.pass` - map and link, start or rebuild
//! - `sqtpm-deploy --no-rebuild hw3` - same, keeping the current image
//! - `sqtpm-deploy --remove hw1:users.pass` - drop a saved pair
//! - `sqtpm-deploy --list-pass-files` / `--example-config` - helpers

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

use sqtpm_deploy::commands::{self, DeployArgs};
use sqtpm_deploy_core::domain::deploy_config::CONFIG_PATH_ENV;

/// Deploy assignments and password files into the SQTPM container
#[derive(Parser)]
#[command(name = "sqtpm-deploy")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, env = CONFIG_PATH_ENV, value_name = "FILE")]
    config: Option<PathBuf>,

    /// List the *.pass files of the working directory and exit
    #[arg(long)]
    list_pass_files: bool,

    /// Write an example configuration document and exit
    #[arg(
        long,
        value_name = "PATH",
        num_args = 0..=1,
        default_missing_value = "sqtpm-deploy.yaml"
    )]
    example_config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SQTPM_DEPLOY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(flatten)]
    deploy: DeployArgs,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    init_logging(&cli.log_level)?;

    if let Some(output) = &cli.example_config {
        return commands::config::generate(output);
    }

    if cli.list_pass_files {
        let cwd = std::env::current_dir().context("Failed to resolve working directory")?;
        return commands::config::list_pass_files(&cwd);
    }

    commands::deploy::handle_command(cli.deploy, cli.config).await
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    // stdout carries the report (possibly JSON)
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
