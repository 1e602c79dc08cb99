// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Persisted deployment state
//!
//! The state document is meant to be edited by hand between runs, so every
//! field is optional on read and unknown keys are ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::mapping::Mapping;

/// How the container image is treated on deploy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildMode {
    /// Rebuild the image and restart the container
    #[default]
    Rebuild,
    /// Keep the image; only touch mounts and links
    Reuse,
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rebuild => f.write_str("rebuild"),
            Self::Reuse => f.write_str("reuse"),
        }
    }
}

/// Scalar settings carried next to the mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSettings {
    /// Host file mounted over the grading application's configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_file: Option<String>,

    /// Container the service runs in (e.g. "sqtpm-sqtpm-web-1")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_mode: Option<BuildMode>,
}

impl DeploymentSettings {
    /// Values present in `other` win; absent ones keep the current value.
    pub fn overlay(&mut self, other: &DeploymentSettings) {
        if let Some(config_file) = &other.config_file {
            self.config_file = Some(config_file.clone());
        }
        if let Some(container_name) = &other.container_name {
            self.container_name = Some(container_name.clone());
        }
        if let Some(build_mode) = other.build_mode {
            self.build_mode = Some(build_mode);
        }
    }
}

/// Everything the mapping store persists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentState {
    #[serde(default)]
    pub assignments: Mapping,

    #[serde(flatten)]
    pub settings: DeploymentSettings,

    /// Last successful save, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DeploymentState {
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty() && self.settings == DeploymentSettings::default()
    }
}
