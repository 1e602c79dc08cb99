// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Value Objects
// ============================================================================

/// Volume access mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessMode {
    /// Read-only access
    ReadOnly,
    /// Read-write access
    #[default]
    ReadWrite,
}

impl AccessMode {
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

/// What a plan entry mounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    AssignmentDirectory,
    PasswordFile,
    ConfigFile,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AssignmentDirectory => f.write_str("assignment directory"),
            Self::PasswordFile => f.write_str("password file"),
            Self::ConfigFile => f.write_str("config file"),
        }
    }
}

/// One host → container bind mount
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VolumePlanEntry {
    /// Absolute path on the host
    pub host_path: PathBuf,

    /// Mount point inside the container
    pub container_path: PathBuf,

    pub mode: AccessMode,

    pub kind: ResourceKind,
}

impl VolumePlanEntry {
    pub fn new(host_path: PathBuf, container_path: PathBuf, mode: AccessMode, kind: ResourceKind) -> Self {
        Self {
            host_path,
            container_path,
            mode,
            kind,
        }
    }
}

// ============================================================================
// Aggregate: VolumePlan
// ============================================================================

/// Ordered, deduplicated list of bind mounts derived from the deployment state
///
/// Never persisted; recomputed from the state on every run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumePlan {
    entries: Vec<VolumePlanEntry>,
}

impl VolumePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry unless its container path is already planned.
    /// Returns whether the entry was added.
    pub fn push(&mut self, entry: VolumePlanEntry) -> bool {
        if self
            .entries
            .iter()
            .any(|existing| existing.container_path == entry.container_path)
        {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn entries(&self) -> &[VolumePlanEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when every entry of `other` is also planned here
    pub fn is_superset_of(&self, other: &VolumePlan) -> bool {
        let mine: BTreeSet<&VolumePlanEntry> = self.entries.iter().collect();
        other.entries.iter().all(|entry| mine.contains(entry))
    }
}

// ============================================================================
// Domain Errors
// ============================================================================

/// A host resource referenced by the mapping does not exist
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} not found: {}", .path.display())]
pub struct MissingResourceError {
    pub kind: ResourceKind,
    pub path: PathBuf,
}
