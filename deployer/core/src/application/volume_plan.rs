// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Volume Plan Builder
//!
//! Derives the bind mounts for the service container from the deployment
//! state. Assignment groups follow the mapping's sorted order; inside a group
//! the directory comes first, then any password file not already planned.
//! The config override, if any, is planned last. Every host path is checked
//! before anything is returned, so callers never see a partial plan.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::domain::deployment_state::DeploymentState;
use crate::domain::path_sanitizer::{PathSanitizer, PathSanitizerError};
use crate::domain::volume::{AccessMode, MissingResourceError, ResourceKind, VolumePlan, VolumePlanEntry};

#[derive(Debug, Error)]
pub enum VolumePlanError {
    #[error(transparent)]
    Missing(#[from] MissingResourceError),

    #[error("cannot mount {}: {source}", .path.display())]
    InvalidPath {
        path: PathBuf,
        #[source]
        source: PathSanitizerError,
    },
}

pub struct VolumePlanBuilder {
    /// Host directory assignment and password-file names are relative to
    source_root: PathBuf,
    /// Document root inside the container
    server_root: PathBuf,
    sanitizer: PathSanitizer,
}

impl VolumePlanBuilder {
    pub fn new(source_root: impl Into<PathBuf>, server_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            server_root: server_root.into(),
            sanitizer: PathSanitizer::new(),
        }
    }

    pub fn build(&self, state: &DeploymentState) -> Result<VolumePlan, VolumePlanError> {
        let mut plan = VolumePlan::new();

        for (assignment, pass_files) in state.assignments.iter() {
            let host_dir = self.source_root.join(assignment.as_str());
            require(&host_dir, ResourceKind::AssignmentDirectory)?;
            plan.push(VolumePlanEntry::new(
                host_dir,
                self.container_path(assignment.as_str())?,
                AccessMode::ReadWrite,
                ResourceKind::AssignmentDirectory,
            ));

            for pass_file in pass_files {
                let host_file = self.source_root.join(pass_file.as_str());
                require(&host_file, ResourceKind::PasswordFile)?;
                plan.push(VolumePlanEntry::new(
                    host_file,
                    self.container_path(pass_file.as_str())?,
                    AccessMode::ReadWrite,
                    ResourceKind::PasswordFile,
                ));
            }
        }

        if let Some(config_file) = &state.settings.config_file {
            let host_file = self.source_root.join(config_file);
            require(&host_file, ResourceKind::ConfigFile)?;
            let name = host_file
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| VolumePlanError::InvalidPath {
                    path: host_file.clone(),
                    source: PathSanitizerError::Empty,
                })?
                .to_string();
            let container_path = self.container_path(&name)?;
            plan.push(VolumePlanEntry::new(
                host_file,
                container_path,
                AccessMode::ReadOnly,
                ResourceKind::ConfigFile,
            ));
        }

        debug!(entries = plan.len(), "Built volume plan");
        Ok(plan)
    }

    fn container_path(&self, name: &str) -> Result<PathBuf, VolumePlanError> {
        self.sanitizer
            .join_under(&self.server_root, &[name])
            .map_err(|source| VolumePlanError::InvalidPath {
                path: PathBuf::from(name),
                source,
            })
    }
}

fn require(path: &Path, kind: ResourceKind) -> Result<(), MissingResourceError> {
    let present = match kind {
        ResourceKind::AssignmentDirectory => path.is_dir(),
        ResourceKind::PasswordFile | ResourceKind::ConfigFile => path.is_file(),
    };
    if present {
        Ok(())
    } else {
        Err(MissingResourceError {
            kind,
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mapping::{AssignmentName, CandidateSet, PasswordFileRef};
    use std::fs;

    const ROOT: &str = "/usr/local/apache2/htdocs";

    fn workspace() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for assignment in ["hw1", "hw2", "hw3"] {
            fs::create_dir(dir.path().join(assignment)).unwrap();
        }
        for pass_file in ["users.pass", "admins.pass"] {
            fs::write(dir.path().join(pass_file), "alice:hash\n").unwrap();
        }
        fs::write(dir.path().join("sqtpm.cfg"), "").unwrap();
        dir
    }

    fn state(pairs: &[(&str, &str)], bare: &[&str]) -> DeploymentState {
        let mut set = CandidateSet::new();
        for (a, p) in pairs {
            set.add_pair(AssignmentName::new(*a).unwrap(), PasswordFileRef::new(*p).unwrap());
        }
        for a in bare {
            set.add_assignment(AssignmentName::new(*a).unwrap());
        }
        let mut state = DeploymentState::default();
        state.assignments.merge(&set);
        state
    }

    fn targets(plan: &VolumePlan) -> Vec<String> {
        plan.entries()
            .iter()
            .map(|e| e.container_path.display().to_string())
            .collect()
    }

    #[test]
    fn test_grouped_order_and_dedup() {
        let dir = workspace();
        let mut state = state(
            &[("hw2", "users.pass"), ("hw1", "users.pass"), ("hw1", "admins.pass")],
            &["hw3"],
        );
        state.settings.config_file = Some("sqtpm.cfg".to_string());

        let plan = VolumePlanBuilder::new(dir.path(), ROOT).build(&state).unwrap();

        assert_eq!(
            targets(&plan),
            vec![
                format!("{ROOT}/hw1"),
                format!("{ROOT}/admins.pass"),
                format!("{ROOT}/users.pass"),
                format!("{ROOT}/hw2"),
                format!("{ROOT}/hw3"),
                format!("{ROOT}/sqtpm.cfg"),
            ]
        );
        let config = plan.entries().last().unwrap();
        assert_eq!(config.mode, AccessMode::ReadOnly);
        assert_eq!(config.host_path, dir.path().join("sqtpm.cfg"));
    }

    #[test]
    fn test_plan_is_monotonic() {
        let dir = workspace();
        let builder = VolumePlanBuilder::new(dir.path(), ROOT);

        let small = builder.build(&state(&[("hw2", "admins.pass")], &[])).unwrap();
        let large = builder
            .build(&state(
                &[("hw1", "users.pass"), ("hw2", "admins.pass"), ("hw2", "users.pass")],
                &["hw3"],
            ))
            .unwrap();

        assert!(large.is_superset_of(&small));
    }

    #[test]
    fn test_missing_assignment_directory() {
        let dir = workspace();
        let err = VolumePlanBuilder::new(dir.path(), ROOT)
            .build(&state(&[("hw9", "users.pass")], &[]))
            .unwrap_err();

        match err {
            VolumePlanError::Missing(missing) => {
                assert_eq!(missing.kind, ResourceKind::AssignmentDirectory);
                assert_eq!(missing.path, dir.path().join("hw9"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_password_file_and_config() {
        let dir = workspace();
        let builder = VolumePlanBuilder::new(dir.path(), ROOT);

        let err = builder.build(&state(&[("hw1", "ghosts.pass")], &[])).unwrap_err();
        assert!(matches!(
            err,
            VolumePlanError::Missing(MissingResourceError { kind: ResourceKind::PasswordFile, .. })
        ));

        let mut with_config = state(&[], &["hw1"]);
        with_config.settings.config_file = Some("missing.cfg".to_string());
        assert!(matches!(
            builder.build(&with_config),
            Err(VolumePlanError::Missing(MissingResourceError { kind: ResourceKind::ConfigFile, .. }))
        ));
    }

    #[test]
    fn test_directory_where_file_expected() {
        let dir = workspace();
        fs::create_dir(dir.path().join("dir.pass")).unwrap();
        assert!(VolumePlanBuilder::new(dir.path(), ROOT)
            .build(&state(&[("hw1", "dir.pass")], &[]))
            .is_err());
    }
}
