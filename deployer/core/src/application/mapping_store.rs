// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Mapping Store
//!
//! Owns the persisted [`DeploymentState`]. The document lives next to the
//! compose project and is hand-editable; writes go through a temp file and a
//! rename so a crash mid-write leaves the previous version intact.
//!
//! Concurrent deploys are serialized with an advisory lock on a sibling
//! `.lock` file, held for the whole load → merge → save section.

use chrono::Utc;
use fs4::fs_std::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::deployment_state::DeploymentState;

pub const DEFAULT_STATE_FILE: &str = "sqtpm-deploy.state.yaml";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read state {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state {path} is not valid: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to write state {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to lock state {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_yaml::Error),
}

/// Exclusive hold on the store; released on drop
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release store lock {}: {}", self.path.display(), e);
        }
    }
}

pub struct MappingStore {
    path: PathBuf,
}

impl MappingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_STATE_FILE.into());
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Block until this process holds the store lock.
    pub fn lock(&self) -> Result<StoreLock, PersistenceError> {
        let path = self.lock_path();
        let lock_err = |source| PersistenceError::Lock {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(lock_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(lock_err)?;
        file.lock_exclusive().map_err(lock_err)?;

        debug!("Acquired store lock {}", path.display());
        Ok(StoreLock { file, path })
    }

    /// Read the persisted state; a missing store is an empty state.
    pub fn load(&self) -> Result<DeploymentState, PersistenceError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No state at {}; starting from an empty mapping", self.path.display());
                return Ok(DeploymentState::default());
            }
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(DeploymentState::default());
        }

        let state: DeploymentState =
            serde_yaml::from_str(&content).map_err(|source| PersistenceError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        debug!(
            assignments = state.assignments.len(),
            "Loaded state from {}",
            self.path.display()
        );
        Ok(state)
    }

    /// Atomically replace the store with `state`, stamping `updated_at`.
    pub fn save(&self, state: &mut DeploymentState) -> Result<(), PersistenceError> {
        state.updated_at = Some(Utc::now());
        let yaml = serde_yaml::to_string(state)?;

        let write_err = |source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(write_err)?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
        temp.write_all(STATE_HEADER.as_bytes()).map_err(write_err)?;
        temp.write_all(yaml.as_bytes()).map_err(write_err)?;
        temp.as_file().sync_all().map_err(write_err)?;
        temp.persist(&self.path).map_err(|e| write_err(e.error))?;

        info!(
            assignments = state.assignments.len(),
            "Saved state to {}",
            self.path.display()
        );
        Ok(())
    }
}

const STATE_HEADER: &str = "# sqtpm-deploy state: assignment -> password files.\n\
# Safe to edit by hand; entries are only removed with --remove or by editing.\n";
