// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Symlink Reconciler
//!
//! Makes every `<root>/<assignment>/<file> -> ../<file>` link of the mapping
//! exist with the right target. Links of assignments outside the mapping are
//! never looked at, and entries that are not links are never removed.
//! A failed link is recorded and the remaining ones are still processed.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::mapping::Mapping;
use crate::domain::symlink::{LinkError, LinkFilesystem, LinkState, SymlinkSpec};

/// Desired links for the whole mapping, in mapping order
pub fn symlink_specs(mapping: &Mapping, server_root: &Path) -> Vec<SymlinkSpec> {
    mapping
        .iter()
        .flat_map(|(assignment, pass_files)| {
            pass_files.iter().map(move |pass_file| SymlinkSpec {
                link_path: server_root.join(assignment.as_str()).join(pass_file.as_str()),
                target: Path::new("..").join(pass_file.as_str()),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    pub created: Vec<PathBuf>,
    pub replaced: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
    pub failures: Vec<LinkError>,
}

impl LinkReport {
    /// Number of links created or replaced
    pub fn mutations(&self) -> usize {
        self.created.len() + self.replaced.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct SymlinkReconciler {
    fs: Arc<dyn LinkFilesystem>,
}

impl SymlinkReconciler {
    pub fn new(fs: Arc<dyn LinkFilesystem>) -> Self {
        Self { fs }
    }

    pub async fn reconcile(&self, specs: &[SymlinkSpec]) -> LinkReport {
        let mut report = LinkReport::default();

        for spec in specs {
            match self.reconcile_one(spec).await {
                Ok(LinkState::LinkedCorrect) => report.unchanged.push(spec.link_path.clone()),
                Ok(LinkState::Absent) => report.created.push(spec.link_path.clone()),
                Ok(_) => report.replaced.push(spec.link_path.clone()),
                Err(e) => {
                    warn!("Link {} not reconciled: {}", spec.link_path.display(), e);
                    report.failures.push(e);
                }
            }
        }

        info!(
            created = report.created.len(),
            replaced = report.replaced.len(),
            unchanged = report.unchanged.len(),
            failed = report.failures.len(),
            "Reconciled password-file links"
        );
        report
    }

    /// Returns the state the link was found in.
    async fn reconcile_one(&self, spec: &SymlinkSpec) -> Result<LinkState, LinkError> {
        let entry = self.fs.inspect(&spec.link_path).await?;
        let state = LinkState::classify(&entry, spec);
        debug!("{} is {:?}", spec.link_path.display(), state);

        match state {
            LinkState::LinkedCorrect => {}
            LinkState::Absent => {
                self.fs.create_symlink(&spec.target, &spec.link_path).await?;
            }
            LinkState::LinkedStale | LinkState::OccupiedByOtherFile => {
                self.fs.remove_link(&spec.link_path).await?;
                self.fs.create_symlink(&spec.target, &spec.link_path).await?;
            }
            LinkState::Conflict => {
                return Err(LinkError::Conflict {
                    path: spec.link_path.clone(),
                })
            }
        }
        Ok(state)
    }
}
