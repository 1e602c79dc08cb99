// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Helper actions that exit without deploying
//!
//! - `--example-config [PATH]` writes a commented configuration document
//! - `--list-pass-files` lists the password files of the working directory

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use sqtpm_deploy_core::application::input_parser;

pub const EXAMPLE_CONFIG: &str = include_str!("../../templates/deploy-config-example.yaml");

pub fn generate(output: &Path) -> Result<()> {
    std::fs::write(output, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write example configuration to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Example configuration written: {}", output.display()).green()
    );
    Ok(())
}

pub fn list_pass_files(dir: &Path) -> Result<()> {
    let files = input_parser::list_pass_files(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?;

    if files.is_empty() {
        println!("{}", format!("No .pass files in {}", dir.display()).yellow());
        return Ok(());
    }

    println!("{}", "Password files:".bold());
    for file in files {
        println!("  {}", file);
    }
    Ok(())
}
