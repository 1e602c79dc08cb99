// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Password-file links inside assignment directories
//!
//! Each (assignment, password file) pair of the mapping is exposed as
//! `<root>/<assignment>/<file> -> ../<file>`, so the grading application
//! finds the credentials next to the assignment it protects.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Desired link, derived per mapping pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymlinkSpec {
    /// Absolute path of the link (in the served filesystem)
    pub link_path: PathBuf,
    /// Link target as written into the link
    pub target: PathBuf,
}

/// What currently sits at a link path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEntry {
    Absent,
    Symlink { target: PathBuf, target_exists: bool },
    /// A regular file, directory or anything else that is not a link
    Other,
}

/// Classification of a link path against the desired link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkState {
    Absent,
    LinkedCorrect,
    /// Link to a different target that no longer resolves
    LinkedStale,
    /// Link to a different, existing file
    OccupiedByOtherFile,
    /// Not a link at all; never overwritten
    Conflict,
}

impl LinkState {
    pub fn classify(entry: &LinkEntry, spec: &SymlinkSpec) -> Self {
        match entry {
            LinkEntry::Absent => Self::Absent,
            LinkEntry::Symlink { target, .. } if target == &spec.target => Self::LinkedCorrect,
            LinkEntry::Symlink { target_exists: false, .. } => Self::LinkedStale,
            LinkEntry::Symlink { target_exists: true, .. } => Self::OccupiedByOtherFile,
            LinkEntry::Other => Self::Conflict,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum LinkError {
    #[error("{}: a non-link entry is in the way", .path.display())]
    Conflict { path: PathBuf },
    #[error("{}: permission denied", .path.display())]
    PermissionDenied { path: PathBuf },
    #[error("{}: {message}", .path.display())]
    Io { path: PathBuf, message: String },
}

impl LinkError {
    pub fn path(&self) -> &Path {
        match self {
            Self::Conflict { path } | Self::PermissionDenied { path } | Self::Io { path, .. } => path,
        }
    }

    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => Self::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            },
        }
    }
}

/// Filesystem operations the reconciler needs, in whatever filesystem the
/// served root lives in.
#[async_trait]
pub trait LinkFilesystem: Send + Sync {
    async fn inspect(&self, path: &Path) -> Result<LinkEntry, LinkError>;

    async fn create_symlink(&self, target: &Path, link: &Path) -> Result<(), LinkError>;

    /// Remove a symbolic link (never a regular file)
    async fn remove_link(&self, link: &Path) -> Result<(), LinkError>;
}
