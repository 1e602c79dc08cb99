// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Container Controller
//!
//! Brings the web service container in line with a [`VolumePlan`]:
//! - Rewrites the compose override from the plan
//! - Picks an [`ApplyStrategy`] from the observed state, the build mode and
//!   the runtime's capabilities
//! - Runs it, waits until the container reports running and only then marks
//!   the override as applied
//!
//! Mounts count as changed until an apply with them has succeeded, so a
//! failed or interrupted run is redone in full on retry. Every runtime call
//! is bounded by the command timeout.

use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::deploy_config::RuntimeSettings;
use crate::domain::deployment_state::BuildMode;
use crate::domain::runtime::{ApplyStrategy, ComposeUpRequest, ContainerError, ContainerRuntime, ContainerState};
use crate::domain::volume::VolumePlan;
use crate::infrastructure::compose::{self, ComposeOverride};

/// Where and how the service container is managed
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Compose project directory (where compose runs)
    pub project_dir: PathBuf,
    pub compose_file: String,
    pub override_file: String,
    pub service: String,
    pub container: String,
    pub command_timeout: Duration,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
}

impl ControllerSettings {
    pub fn from_runtime(project_dir: impl Into<PathBuf>, container: impl Into<String>, runtime: &RuntimeSettings) -> Self {
        Self {
            project_dir: project_dir.into(),
            compose_file: runtime.compose_file.clone(),
            override_file: runtime.override_file.clone(),
            service: runtime.service.clone(),
            container: container.into(),
            command_timeout: Duration::from_secs(runtime.command_timeout_secs),
            ready_timeout: Duration::from_secs(runtime.ready_timeout_secs),
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn override_path(&self) -> PathBuf {
        self.project_dir.join(&self.override_file)
    }
}

/// What the controller did
#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutcome {
    pub strategy: ApplyStrategy,
    pub previous_state: ContainerState,
    /// Plan differs from the one the container was last brought up with
    pub mounts_changed: bool,
    pub override_path: PathBuf,
}

/// Decide how to apply a plan.
///
/// A container that is not running is always started. A running one is
/// rebuilt unless the reuse fast path is requested; on the fast path it is
/// left alone when its mounts already match the plan, mutated in place when the
/// runtime can do that, and recreated from the existing image otherwise.
pub fn select_strategy(
    state: ContainerState,
    build_mode: BuildMode,
    mounts_changed: bool,
    supports_live_mounts: bool,
) -> ApplyStrategy {
    match (state, build_mode) {
        (ContainerState::Absent | ContainerState::Stopped, _) => ApplyStrategy::Start,
        (ContainerState::Running, BuildMode::Rebuild) => ApplyStrategy::Rebuild,
        (ContainerState::Running, BuildMode::Reuse) if !mounts_changed => ApplyStrategy::Reuse,
        (ContainerState::Running, BuildMode::Reuse) if supports_live_mounts => ApplyStrategy::MutateLive,
        (ContainerState::Running, BuildMode::Reuse) => ApplyStrategy::Recreate,
    }
}

pub struct ContainerController {
    runtime: Arc<dyn ContainerRuntime>,
    settings: ControllerSettings,
}

impl ContainerController {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, settings: ControllerSettings) -> Self {
        Self { runtime, settings }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub async fn apply(&self, plan: &VolumePlan, build_mode: BuildMode) -> Result<ApplyOutcome, ContainerError> {
        let override_path = self.settings.override_path();
        let rendered = ComposeOverride::from_plan(&self.settings.service, plan)
            .render()
            .map_err(|e| ContainerError::OverrideWrite {
                path: override_path.clone(),
                message: e.to_string(),
            })?;
        compose::write_override(&override_path, &rendered)?;
        let mounts_changed = !compose::is_applied(&override_path, &rendered);

        self.bounded("reach container runtime", self.runtime.healthcheck())
            .await?;

        let container = self.settings.container.as_str();
        let previous_state = self
            .bounded("inspect container", self.runtime.state(container))
            .await?;

        let strategy = select_strategy(
            previous_state,
            build_mode,
            mounts_changed,
            self.runtime.supports_live_mounts(),
        );
        info!(
            container = %container,
            state = %previous_state,
            build_mode = %build_mode,
            mounts_changed,
            strategy = %strategy,
            "Applying volume plan"
        );

        match strategy {
            ApplyStrategy::Reuse => debug!("Mounts unchanged; leaving {} as is", container),
            ApplyStrategy::MutateLive => {
                self.bounded("update mounts", self.runtime.update_mounts(container, plan))
                    .await?;
            }
            ApplyStrategy::Start | ApplyStrategy::Rebuild | ApplyStrategy::Recreate => {
                let request = ComposeUpRequest {
                    project_dir: self.settings.project_dir.clone(),
                    files: vec![
                        PathBuf::from(&self.settings.compose_file),
                        PathBuf::from(&self.settings.override_file),
                    ],
                    service: self.settings.service.clone(),
                    build: build_mode == BuildMode::Rebuild,
                };
                self.bounded("compose up", self.runtime.compose_up(&request)).await?;
            }
        }

        if strategy.restarts_container() {
            self.wait_until_running().await?;
        }
        if mounts_changed {
            compose::mark_applied(&override_path, &rendered)?;
        }

        Ok(ApplyOutcome {
            strategy,
            previous_state,
            mounts_changed,
            override_path,
        })
    }

    /// Poll the container state until it is running or the ready timeout
    /// expires.
    pub async fn wait_until_running(&self) -> Result<(), ContainerError> {
        let container = self.settings.container.as_str();
        let deadline = tokio::time::Instant::now() + self.settings.ready_timeout;

        loop {
            match self.bounded("inspect container", self.runtime.state(container)).await? {
                ContainerState::Running => {
                    info!("Container {} is running", container);
                    return Ok(());
                }
                state => debug!("Container {} is {}; waiting", container, state),
            }

            if tokio::time::Instant::now() >= deadline {
                warn!("Container {} did not start in {:?}", container, self.settings.ready_timeout);
                return Err(ContainerError::NotReady {
                    container: container.to_string(),
                    waited: self.settings.ready_timeout,
                });
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T, ContainerError>
    where
        F: Future<Output = Result<T, ContainerError>>,
    {
        tokio::time::timeout(self.settings.command_timeout, fut)
            .await
            .map_err(|_| ContainerError::Timeout {
                operation: operation.to_string(),
                after: self.settings.command_timeout,
            })?
    }
}
