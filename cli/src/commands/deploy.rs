// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Deploy command
//!
//! Collects candidates from the configuration document and the positional
//! pair expressions, wires the Docker runtime into the deploy pipeline and
//! prints the report.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use sqtpm_deploy_core::application::input_parser::{candidates_from_document, parse_pair_expressions};
use sqtpm_deploy_core::application::mapping_store::DEFAULT_STATE_FILE;
use sqtpm_deploy_core::application::{DeployReport, DeployRequest, DeployService, MappingStore, ValidationOrder};
use sqtpm_deploy_core::domain::deploy_config::DeployConfigManifest;
use sqtpm_deploy_core::domain::deployment_state::BuildMode;
use sqtpm_deploy_core::infrastructure::DockerComposeRuntime;

#[derive(Debug, Clone, Default, Args)]
pub struct DeployArgs {
    /// Pair expressions: assign1[,assign2...][:file1.pass[,file2.pass...]]
    #[arg(value_name = "PAIRS")]
    pub pairs: Vec<String>,

    /// Container running the web service (persisted)
    #[arg(long, value_name = "NAME")]
    pub container: Option<String>,

    /// Host file mounted read-only over the grading configuration (persisted)
    #[arg(long, value_name = "FILE")]
    pub config_file: Option<String>,

    /// State file (default: ./sqtpm-deploy.state.yaml)
    #[arg(long, value_name = "FILE")]
    pub state: Option<PathBuf>,

    /// Keep the current image; only touch mounts and links
    #[arg(long, conflicts_with = "rebuild")]
    pub no_rebuild: bool,

    /// Rebuild the image even if the saved build mode is reuse
    #[arg(long)]
    pub rebuild: bool,

    /// Remove a pair or a whole assignment from the saved mapping (repeatable)
    #[arg(long, value_name = "PAIR")]
    pub remove: Vec<String>,

    /// Check host paths before saving; nothing is saved if one is missing
    #[arg(long)]
    pub validate_first: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl DeployArgs {
    fn build_mode(&self) -> Option<BuildMode> {
        if self.no_rebuild {
            Some(BuildMode::Reuse)
        } else if self.rebuild {
            Some(BuildMode::Rebuild)
        } else {
            None
        }
    }
}

/// Turn the document and the arguments into a pipeline request.
pub fn build_request(args: &DeployArgs, manifest: &DeployConfigManifest) -> Result<DeployRequest> {
    let mut candidates = candidates_from_document(manifest).context("Invalid assignments in configuration")?;
    candidates.extend(parse_pair_expressions(&args.pairs).context("Invalid pair expression")?);

    let removals = parse_pair_expressions(&args.remove).context("Invalid --remove expression")?;

    let mut settings = manifest.settings();
    if let Some(container) = &args.container {
        settings.container_name = Some(container.clone());
    }
    if let Some(config_file) = &args.config_file {
        settings.config_file = Some(config_file.clone());
    }

    Ok(DeployRequest {
        candidates,
        removals,
        settings,
        build_mode: args.build_mode(),
        validation_order: if args.validate_first {
            ValidationOrder::ValidateThenPersist
        } else {
            ValidationOrder::PersistThenValidate
        },
    })
}

pub async fn handle_command(args: DeployArgs, config_path: Option<PathBuf>) -> Result<()> {
    let manifest = DeployConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    let request = build_request(&args, &manifest)?;

    let source_root = std::env::current_dir().context("Failed to resolve working directory")?;
    let state_path = args
        .state
        .clone()
        .unwrap_or_else(|| source_root.join(DEFAULT_STATE_FILE));

    let runtime_settings = manifest.spec.runtime.clone();
    // The daemon is first contacted after the merged state is saved
    let runtime = DockerComposeRuntime::new(runtime_settings.compose_command.clone(), None)
        .context("Failed to set up the container runtime")?;

    info!(
        candidates = request.candidates.pairs.len(),
        removals = request.removals.assignments.len(),
        "Deploying from {}",
        source_root.display()
    );

    let service = DeployService::new(
        Arc::new(runtime),
        MappingStore::new(state_path),
        source_root,
        runtime_settings,
    );
    let report = service.deploy(request).await.context("Deploy failed")?;

    if args.json {
        println!("{}", report.to_json().context("Failed to encode report")?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &DeployReport) {
    println!("{}", "Assignments:".bold());
    if report.mapping.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for (assignment, pass_files) in report.mapping.iter() {
        let files: Vec<&str> = pass_files.iter().map(|f| f.as_str()).collect();
        if files.is_empty() {
            println!("  {}", assignment);
        } else {
            println!("  {} → {}", assignment, files.join(", "));
        }
    }
    println!();

    println!(
        "  Container: {} ({}, build mode {})",
        report.container, report.apply.strategy, report.build_mode
    );
    println!("  Mounts: {}", report.plan.len());
    println!(
        "  Links: {} created, {} replaced, {} unchanged",
        report.links.created.len(),
        report.links.replaced.len(),
        report.links.unchanged.len()
    );
    println!("  State: {}", display_path(&report.state_path));
    println!();

    for warning in &report.warnings {
        println!("{}", format!("⚠ {}", warning).yellow());
    }

    println!(
        "{}",
        format!("✓ Deployed; grading service at {}", report.public_url).green()
    );
}

fn display_path(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(|p| p.display().to_string()))
        .unwrap_or_else(|| path.display().to_string())
}
