// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Input Parser
//!
//! Turns pair expressions (`hw1,hw2:users.pass,admins.pass`) and deploy
//! configuration documents into a [`CandidateSet`]. Pure: no filesystem or
//! container access happens here.

use std::path::Path;
use thiserror::Error;
use tracing::debug;

pub use crate::domain::mapping::CandidateSet;
use crate::domain::deploy_config::{ConfigError, DeployConfigManifest};
use crate::domain::mapping::{AssignmentName, PasswordFileRef};
use crate::domain::path_sanitizer::PathSanitizerError;

const PAIR_SEPARATOR: char = ':';
const LIST_SEPARATOR: char = ',';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty pair expression")]
    Empty,

    #[error("'{expression}': more than one '{}' separator", PAIR_SEPARATOR)]
    UnbalancedSeparator { expression: String },

    #[error("'{expression}': no assignment before '{}'", PAIR_SEPARATOR)]
    EmptyAssignment { expression: String },

    #[error("'{expression}': no password file after '{}'", PAIR_SEPARATOR)]
    MissingPassFiles { expression: String },

    #[error("'{expression}': empty element in comma-separated list")]
    EmptyElement { expression: String },

    #[error("'{token}' in '{expression}': {source}")]
    InvalidName {
        token: String,
        expression: String,
        #[source]
        source: PathSanitizerError,
    },
}

/// Parse a single `assign1[,assign2,...][:pwfile1[,pwfile2,...]]` expression.
pub fn parse_pair_expression(expression: &str) -> Result<CandidateSet, ParseError> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut parts = trimmed.split(PAIR_SEPARATOR);
    let assignments_part = parts.next().unwrap_or_default();
    let pass_files_part = parts.next();
    if parts.next().is_some() {
        return Err(ParseError::UnbalancedSeparator {
            expression: trimmed.to_string(),
        });
    }

    if assignments_part.trim().is_empty() {
        return Err(ParseError::EmptyAssignment {
            expression: trimmed.to_string(),
        });
    }

    let assignments = split_list(assignments_part, trimmed)?
        .into_iter()
        .map(|token| {
            // `hw1/` from shell completion names the same directory
            let token = token.strip_suffix('/').unwrap_or(token);
            AssignmentName::new(token).map_err(|source| invalid(token, trimmed, source))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let pass_files = match pass_files_part {
        None => Vec::new(),
        Some(part) if part.trim().is_empty() => {
            return Err(ParseError::MissingPassFiles {
                expression: trimmed.to_string(),
            })
        }
        Some(part) => split_list(part, trimmed)?
            .into_iter()
            .map(|token| PasswordFileRef::new(token).map_err(|source| invalid(token, trimmed, source)))
            .collect::<Result<Vec<_>, _>>()?,
    };

    let mut candidates = CandidateSet::new();
    for assignment in assignments {
        candidates.add_assignment(assignment.clone());
        for pass_file in &pass_files {
            candidates.add_pair(assignment.clone(), pass_file.clone());
        }
    }

    debug!(
        expression = %trimmed,
        assignments = candidates.assignments.len(),
        pairs = candidates.pairs.len(),
        "Parsed pair expression"
    );
    Ok(candidates)
}

/// Parse every expression, stopping at the first malformed one.
pub fn parse_pair_expressions<I, S>(expressions: I) -> Result<CandidateSet, ParseError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut candidates = CandidateSet::new();
    for expression in expressions {
        candidates.extend(parse_pair_expression(expression.as_ref())?);
    }
    Ok(candidates)
}

/// Collect the candidates declared by a configuration document: the
/// `assignments` table first, then every group.
pub fn candidates_from_document(manifest: &DeployConfigManifest) -> Result<CandidateSet, ConfigError> {
    let mut candidates = CandidateSet::new();

    for (assignment, pass_files) in &manifest.spec.assignments {
        let assignment = document_assignment(assignment)?;
        candidates.add_assignment(assignment.clone());
        for pass_file in pass_files {
            candidates.add_pair(assignment.clone(), document_pass_file(pass_file)?);
        }
    }

    for group in &manifest.spec.groups {
        let pass_files = group
            .pass_files
            .iter()
            .map(|name| document_pass_file(name))
            .collect::<Result<Vec<_>, _>>()?;
        for assignment in &group.assignments {
            let assignment = document_assignment(assignment)?;
            candidates.add_assignment(assignment.clone());
            for pass_file in &pass_files {
                candidates.add_pair(assignment.clone(), pass_file.clone());
            }
        }
    }

    Ok(candidates)
}

/// `*.pass` files directly inside `dir`, sorted by name
pub fn list_pass_files(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(".pass") {
                found.push(name.to_string());
            }
        }
    }
    found.sort();
    Ok(found)
}

fn split_list<'a>(part: &'a str, expression: &str) -> Result<Vec<&'a str>, ParseError> {
    part.split(LIST_SEPARATOR)
        .map(str::trim)
        .map(|token| {
            if token.is_empty() {
                Err(ParseError::EmptyElement {
                    expression: expression.to_string(),
                })
            } else {
                Ok(token)
            }
        })
        .collect()
}

fn invalid(token: &str, expression: &str, source: PathSanitizerError) -> ParseError {
    ParseError::InvalidName {
        token: token.to_string(),
        expression: expression.to_string(),
        source,
    }
}

fn document_assignment(name: &str) -> Result<AssignmentName, ConfigError> {
    AssignmentName::new(name.trim_end_matches('/'))
        .map_err(|e| ConfigError::Invalid(format!("assignment '{}': {}", name, e)))
}

fn document_pass_file(name: &str) -> Result<PasswordFileRef, ConfigError> {
    PasswordFileRef::new(name).map_err(|e| ConfigError::Invalid(format!("password file '{}': {}", name, e)))
}
