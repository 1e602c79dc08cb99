// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::domain::volume::VolumePlan;

/// Observed state of the service container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Stopped,
    Absent,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Stopped => f.write_str("stopped"),
            Self::Absent => f.write_str("absent"),
        }
    }
}

/// How the controller brings the container in line with the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyStrategy {
    /// Container not running: bring it up
    Start,
    /// Running, rebuild requested: rebuild image and restart
    Rebuild,
    /// Running, fast path, mounts unchanged: leave the container alone
    Reuse,
    /// Running, fast path, runtime can change mounts on a live container
    MutateLive,
    /// Running, fast path, no live mount support: recreate, keep the image
    Recreate,
}

impl ApplyStrategy {
    /// Whether the container is (re)created and has to be waited for
    pub fn restarts_container(&self) -> bool {
        matches!(self, Self::Start | Self::Rebuild | Self::Recreate)
    }
}

impl fmt::Display for ApplyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Start => "start",
            Self::Rebuild => "rebuild",
            Self::Reuse => "reuse",
            Self::MutateLive => "mutate-live",
            Self::Recreate => "recreate",
        };
        f.write_str(label)
    }
}

/// Arguments of a `compose up`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeUpRequest {
    /// Directory compose runs in
    pub project_dir: PathBuf,
    /// Compose files, base first, generated override last
    pub files: Vec<PathBuf>,
    pub service: String,
    /// `--build` when true, `--no-build` otherwise
    pub build: bool,
}

/// Captured result of a command run inside the container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container runtime unreachable: {0}")]
    Unreachable(String),
    #[error("command `{command}` failed: {message}")]
    CommandFailed { command: String, message: String },
    #[error("container {container} is not running after {waited:?}")]
    NotReady { container: String, waited: Duration },
    #[error("`{operation}` timed out after {after:?}")]
    Timeout { operation: String, after: Duration },
    #[error("runtime does not support {0}")]
    Unsupported(String),
    #[error("failed to write {path}: {message}")]
    OverrideWrite { path: PathBuf, message: String },
}

/// Container runtime seam used by the controller, the symlink reconciler and
/// the permission fixer.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Fails with `Unreachable` when the runtime cannot be talked to
    async fn healthcheck(&self) -> Result<(), ContainerError> {
        Ok(())
    }

    async fn state(&self, container: &str) -> Result<ContainerState, ContainerError>;

    async fn compose_up(&self, request: &ComposeUpRequest) -> Result<(), ContainerError>;

    async fn exec(&self, container: &str, cmd: Vec<String>) -> Result<ExecOutput, ContainerError>;

    /// Capability check for changing bind mounts on a running container
    fn supports_live_mounts(&self) -> bool {
        false
    }

    async fn update_mounts(&self, _container: &str, _plan: &VolumePlan) -> Result<(), ContainerError> {
        Err(ContainerError::Unsupported("live mount updates".to_string()))
    }
}
