// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Deploy pipeline
//!
//! Sequences one deployment:
//!
//! 1. Lock the store, load it, apply removals, merge the new candidates,
//!    overlay the settings
//! 2. Build the volume plan and save the state, in the configured
//!    [`ValidationOrder`]; release the lock
//! 3. Apply the plan to the container
//! 4. Reconcile the password-file links inside the container
//! 5. Fix permissions and reload the web server
//!
//! Steps 1-3 fail the deploy. Link and permission problems end up in the
//! report instead.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::container_controller::{ApplyOutcome, ContainerController, ControllerSettings};
use crate::application::input_parser::ParseError;
use crate::application::mapping_store::{MappingStore, PersistenceError};
use crate::application::permission_fixer::PermissionFixer;
use crate::application::symlink_reconciler::{symlink_specs, LinkReport, SymlinkReconciler};
use crate::application::volume_plan::{VolumePlanBuilder, VolumePlanError};
use crate::domain::deploy_config::{ConfigError, RuntimeSettings, DEFAULT_CONTAINER};
use crate::domain::deployment_state::{BuildMode, DeploymentSettings, DeploymentState};
use crate::domain::mapping::{CandidateSet, Mapping, MappingDelta};
use crate::domain::path_sanitizer::PathSanitizerError;
use crate::domain::runtime::{ContainerError, ContainerRuntime};
use crate::domain::symlink::LinkFilesystem;
use crate::domain::volume::{MissingResourceError, VolumePlan};
use crate::infrastructure::link_fs::ContainerLinkFilesystem;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    MissingResource(#[from] MissingResourceError),

    #[error("cannot mount {}: {source}", .path.display())]
    InvalidPath {
        path: PathBuf,
        #[source]
        source: PathSanitizerError,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Container(#[from] ContainerError),
}

impl From<VolumePlanError> for DeployError {
    fn from(err: VolumePlanError) -> Self {
        match err {
            VolumePlanError::Missing(missing) => Self::MissingResource(missing),
            VolumePlanError::InvalidPath { path, source } => Self::InvalidPath { path, source },
        }
    }
}

/// When host paths are checked relative to saving the merged state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationOrder {
    /// Save first; a missing path then stops the deploy with the entry
    /// already recorded (drop it with a removal)
    #[default]
    PersistThenValidate,
    /// Check first; a missing path leaves the store untouched
    ValidateThenPersist,
}

#[derive(Debug, Clone, Default)]
pub struct DeployRequest {
    pub candidates: CandidateSet,
    pub removals: CandidateSet,
    /// Persisted settings to overlay on the stored ones
    pub settings: DeploymentSettings,
    /// Build mode for this invocation only
    pub build_mode: Option<BuildMode>,
    pub validation_order: ValidationOrder,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub state_path: PathBuf,
    pub mapping: Mapping,
    pub added: MappingDelta,
    pub removed: MappingDelta,
    pub container: String,
    pub build_mode: BuildMode,
    pub plan: VolumePlan,
    pub apply: ApplyOutcome,
    pub links: LinkReport,
    pub warnings: Vec<String>,
    pub public_url: String,
}

impl DeployReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// True when every link was reconciled and no step warned
    pub fn is_clean(&self) -> bool {
        self.links.is_clean() && self.warnings.is_empty()
    }
}

pub struct DeployService {
    runtime: Arc<dyn ContainerRuntime>,
    store: MappingStore,
    /// Compose project directory; assignment and password-file names are
    /// relative to it
    source_root: PathBuf,
    runtime_settings: RuntimeSettings,
    link_fs: Option<Arc<dyn LinkFilesystem>>,
}

impl DeployService {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        store: MappingStore,
        source_root: impl Into<PathBuf>,
        runtime_settings: RuntimeSettings,
    ) -> Self {
        Self {
            runtime,
            store,
            source_root: source_root.into(),
            runtime_settings,
            link_fs: None,
        }
    }

    /// Reconcile links through `fs` instead of exec in the container.
    pub fn with_link_filesystem(mut self, fs: Arc<dyn LinkFilesystem>) -> Self {
        self.link_fs = Some(fs);
        self
    }

    pub fn store(&self) -> &MappingStore {
        &self.store
    }

    pub async fn deploy(&self, request: DeployRequest) -> Result<DeployReport, DeployError> {
        let (state, plan, added, removed) = self.update_state(&request)?;

        let container = state
            .settings
            .container_name
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTAINER.to_string());
        let build_mode = request
            .build_mode
            .or(state.settings.build_mode)
            .unwrap_or_default();

        let controller = ContainerController::new(
            self.runtime.clone(),
            ControllerSettings::from_runtime(&self.source_root, container.clone(), &self.runtime_settings),
        );
        let apply = controller.apply(&plan, build_mode).await?;
        let command_timeout = Duration::from_secs(self.runtime_settings.command_timeout_secs);

        let server_root = Path::new(&self.runtime_settings.server_root);
        let link_fs = match &self.link_fs {
            Some(fs) => fs.clone(),
            None => Arc::new(ContainerLinkFilesystem::new(
                self.runtime.clone(),
                container.clone(),
                command_timeout,
            )),
        };
        let links = SymlinkReconciler::new(link_fs)
            .reconcile(&symlink_specs(&state.assignments, server_root))
            .await;

        let mut warnings: Vec<String> = links
            .failures
            .iter()
            .map(|failure| format!("link not reconciled: {}", failure))
            .collect();
        warnings.extend(
            PermissionFixer::new(
                self.runtime.clone(),
                container.clone(),
                self.runtime_settings.server_root.clone(),
                self.runtime_settings.fix_perms_script.clone(),
                command_timeout,
            )
            .run()
            .await,
        );

        info!(
            container = %container,
            strategy = %apply.strategy,
            assignments = state.assignments.len(),
            warnings = warnings.len(),
            "Deploy finished"
        );

        Ok(DeployReport {
            state_path: self.store.path().to_path_buf(),
            mapping: state.assignments,
            added,
            removed,
            container,
            build_mode,
            plan,
            apply,
            links,
            warnings,
            public_url: self.runtime_settings.public_url.clone(),
        })
    }

    /// Critical section under the store lock.
    fn update_state(
        &self,
        request: &DeployRequest,
    ) -> Result<(DeploymentState, VolumePlan, MappingDelta, MappingDelta), DeployError> {
        let _lock = self.store.lock()?;
        let mut state = self.store.load()?;

        let removed = state.assignments.remove(&request.removals);
        let added = state.assignments.merge(&request.candidates);
        state.settings.overlay(&request.settings);
        info!(
            added_assignments = added.assignments,
            added_pass_files = added.pass_files,
            removed_assignments = removed.assignments,
            removed_pass_files = removed.pass_files,
            "Merged mapping"
        );

        let builder = VolumePlanBuilder::new(&self.source_root, &self.runtime_settings.server_root);
        let plan = match request.validation_order {
            ValidationOrder::ValidateThenPersist => {
                let plan = builder.build(&state)?;
                self.store.save(&mut state)?;
                plan
            }
            ValidationOrder::PersistThenValidate => {
                self.store.save(&mut state)?;
                builder.build(&state).inspect_err(|e| {
                    warn!("State saved to {} but not deployable: {}", self.store.path().display(), e);
                })?
            }
        };

        Ok((state, plan, added, removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_errors_map_to_deploy_errors() {
        let missing = VolumePlanError::Missing(MissingResourceError {
            kind: crate::domain::volume::ResourceKind::AssignmentDirectory,
            path: PathBuf::from("/work/hw9"),
        });
        let err = DeployError::from(missing);
        assert!(matches!(err, DeployError::MissingResource(_)));
        assert!(err.to_string().contains("/work/hw9"));
    }

    #[test]
    fn test_default_order_persists_first() {
        assert_eq!(ValidationOrder::default(), ValidationOrder::PersistThenValidate);
    }
}
