// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Path Sanitizer Domain Service
//!
//! Validates the names that end up as single path segments under the served
//! root (assignment directories, password files, the config override file)
//! and joins them onto container paths without ever leaving the root.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Keeps mount specifications and link paths well-formed

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Characters that break a compose volume spec or a pair expression.
const MOUNT_UNSAFE: &[char] = &['/', '\\', ':', ',', '\0'];

/// Path sanitization errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathSanitizerError {
    #[error("name is empty")]
    Empty,

    #[error("name '{0}' is a relative directory reference")]
    RelativeReference(String),

    #[error("name '{name}' contains forbidden character {ch:?}")]
    ForbiddenCharacter { name: String, ch: char },

    #[error("name '{0}' contains whitespace")]
    Whitespace(String),

    #[error("name '{0}' is too long")]
    TooLong(String),

    #[error("path {0} resolves outside the served root")]
    OutsideBoundary(String),
}

/// Path sanitizer domain service
///
/// # Guarantees
/// - Names are exactly one normal path component
/// - No separators, colons, commas or NUL bytes (compose and pair-expression safe)
/// - Joined container paths always start with the served root
pub struct PathSanitizer {
    /// Maximum allowed segment length (default: 255, the usual NAME_MAX)
    max_segment_len: usize,
}

impl PathSanitizer {
    pub fn new() -> Self {
        Self {
            max_segment_len: 255,
        }
    }

    pub fn with_max_length(max_segment_len: usize) -> Self {
        Self { max_segment_len }
    }

    /// Validate a name that must map to a single path segment.
    ///
    /// ```
    /// use sqtpm_deploy_core::domain::path_sanitizer::PathSanitizer;
    ///
    /// let sanitizer = PathSanitizer::new();
    /// assert!(sanitizer.validate_segment("arvore_geradora_minima").is_ok());
    /// assert!(sanitizer.validate_segment("../etc").is_err());
    /// ```
    pub fn validate_segment(&self, name: &str) -> Result<(), PathSanitizerError> {
        if name.is_empty() {
            return Err(PathSanitizerError::Empty);
        }

        if name.len() > self.max_segment_len {
            return Err(PathSanitizerError::TooLong(name.to_string()));
        }

        if name == "." || name == ".." {
            return Err(PathSanitizerError::RelativeReference(name.to_string()));
        }

        if let Some(ch) = name.chars().find(|c| MOUNT_UNSAFE.contains(c)) {
            return Err(PathSanitizerError::ForbiddenCharacter {
                name: name.to_string(),
                ch,
            });
        }

        if name.chars().any(char::is_whitespace) {
            return Err(PathSanitizerError::Whitespace(name.to_string()));
        }

        Ok(())
    }

    /// Join validated segments onto `root`, rejecting anything that escapes it.
    pub fn join_under(&self, root: &Path, segments: &[&str]) -> Result<PathBuf, PathSanitizerError> {
        let mut joined = root.to_path_buf();
        for segment in segments {
            self.validate_segment(segment)?;
            joined.push(segment);
        }

        let escapes = joined
            .strip_prefix(root)
            .map(|rest| rest.components().any(|c| !matches!(c, Component::Normal(_))))
            .unwrap_or(true);
        if escapes {
            tracing::warn!(path = %joined.display(), root = %root.display(), "Path outside served root");
            return Err(PathSanitizerError::OutsideBoundary(joined.display().to_string()));
        }

        Ok(joined)
    }
}

impl Default for PathSanitizer {
    fn default() -> Self {
        Self::new()
    }
}
