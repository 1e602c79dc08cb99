// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Deploy Configuration Types
//
// Defines the structured configuration document accepted next to (or instead
// of) pair expressions on the command line:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Assignment → password-file table and the parallel "groups" form
// - Scalar settings (container, config file override, build mode)
// - Runtime settings for the compose project and the served root

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::deployment_state::{BuildMode, DeploymentSettings};

pub const API_VERSION: &str = "sqtpm.deploy/v1";
pub const KIND: &str = "DeployConfig";

/// Environment variable naming the configuration document
pub const CONFIG_PATH_ENV: &str = "SQTPM_DEPLOY_CONFIG";
/// Environment variable overriding the container name
pub const CONTAINER_ENV: &str = "SQTPM_DEPLOY_CONTAINER";

const DEFAULT_CONFIG_FILE: &str = "sqtpm-deploy.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level Kubernetes-style deploy configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfigManifest {
    /// API version (must be "sqtpm.deploy/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "DeployConfig")
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ManifestMetadata>,

    #[serde(default)]
    pub spec: DeployConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable deployment name (e.g. the course code)
    pub name: String,
}

/// Deploy configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployConfigSpec {
    /// Container name of the web service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,

    /// Host file mounted over the grading application's configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_mode: Option<BuildMode>,

    /// Assignment name → password files protecting it
    #[serde(default)]
    pub assignments: BTreeMap<String, Vec<String>>,

    /// Each group's password files apply to every assignment of the group
    #[serde(default)]
    pub groups: Vec<AssignmentGroup>,

    #[serde(default)]
    pub runtime: RuntimeSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentGroup {
    pub assignments: Vec<String>,

    #[serde(default)]
    pub pass_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Compose service running the web server
    #[serde(default = "default_service")]
    pub service: String,

    /// Command prefix used to run compose (e.g. ["docker", "compose"])
    #[serde(default = "default_compose_command")]
    pub compose_command: Vec<String>,

    /// Base compose file of the project
    #[serde(default = "default_compose_file")]
    pub compose_file: String,

    /// Generated override file, rewritten on every deploy
    #[serde(default = "default_override_file")]
    pub override_file: String,

    /// Document root inside the container
    #[serde(default = "default_server_root")]
    pub server_root: String,

    /// Permission-fixing script, relative to the served root
    #[serde(default = "default_fix_perms_script")]
    pub fix_perms_script: String,

    /// URL printed after a successful deploy
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Upper bound for any single container runtime call
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// How long to wait for the container to report running
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            service: default_service(),
            compose_command: default_compose_command(),
            compose_file: default_compose_file(),
            override_file: default_override_file(),
            server_root: default_server_root(),
            fix_perms_script: default_fix_perms_script(),
            public_url: default_public_url(),
            command_timeout_secs: default_command_timeout(),
            ready_timeout_secs: default_ready_timeout(),
        }
    }
}

pub const DEFAULT_CONTAINER: &str = "sqtpm-sqtpm-web-1";

fn default_service() -> String {
    "sqtpm-web".to_string()
}

fn default_compose_command() -> Vec<String> {
    vec!["docker".to_string(), "compose".to_string()]
}

fn default_compose_file() -> String {
    "docker-compose.yml".to_string()
}

fn default_override_file() -> String {
    "docker-compose.deploy.yml".to_string()
}

fn default_server_root() -> String {
    "/usr/local/apache2/htdocs".to_string()
}

fn default_fix_perms_script() -> String {
    "Utils/fix-perms.sh".to_string()
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_command_timeout() -> u64 {
    300
}

fn default_ready_timeout() -> u64 {
    60
}

impl Default for DeployConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: None,
            spec: DeployConfigSpec::default(),
        }
    }
}

impl DeployConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })
    }

    /// Discover configuration file using precedence order
    /// 1. SQTPM_DEPLOY_CONFIG environment variable
    /// 2. ./sqtpm-deploy.yaml (working directory)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from(DEFAULT_CONFIG_FILE);
        if cwd.exists() {
            return Some(cwd);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        // Explicit CLI path must exist
        let path = match cli_path {
            Some(path) => {
                tracing::info!("Loading deploy configuration from explicit path: {:?}", path);
                Some(path)
            }
            None => Self::discover_config().inspect(|path| {
                tracing::info!("Loading deploy configuration from discovered path: {:?}", path);
            }),
        };

        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => {
                tracing::debug!("No deploy configuration found; using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(CONTAINER_ENV) {
            if val.trim().is_empty() {
                tracing::warn!("Ignoring empty {}", CONTAINER_ENV);
            } else {
                tracing::info!("Environment override: {}={}", CONTAINER_ENV, val);
                self.spec.container = Some(val);
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version != API_VERSION {
            return Err(ConfigError::Invalid(format!(
                "apiVersion '{}' must be '{}'",
                self.api_version, API_VERSION
            )));
        }

        if self.kind != KIND {
            return Err(ConfigError::Invalid(format!(
                "kind '{}' must be '{}'",
                self.kind, KIND
            )));
        }

        if let Some(container) = &self.spec.container {
            if container.trim().is_empty() {
                return Err(ConfigError::Invalid("spec.container cannot be empty".to_string()));
            }
        }

        for (index, group) in self.spec.groups.iter().enumerate() {
            if group.assignments.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "spec.groups[{}] lists no assignments",
                    index
                )));
            }
        }

        let runtime = &self.spec.runtime;
        if runtime.service.is_empty() {
            return Err(ConfigError::Invalid("spec.runtime.service cannot be empty".to_string()));
        }
        if runtime.compose_command.is_empty() {
            return Err(ConfigError::Invalid(
                "spec.runtime.compose_command cannot be empty".to_string(),
            ));
        }
        if !runtime.server_root.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "spec.runtime.server_root '{}' must be an absolute container path",
                runtime.server_root
            )));
        }
        if runtime.command_timeout_secs == 0 || runtime.ready_timeout_secs == 0 {
            return Err(ConfigError::Invalid("spec.runtime timeouts must be positive".to_string()));
        }

        Ok(())
    }

    /// Scalar settings carried by the document, for overlaying on the store
    pub fn settings(&self) -> DeploymentSettings {
        DeploymentSettings {
            config_file: self.spec.config_file.clone(),
            container_name: self.spec.container.clone(),
            build_mode: self.spec.build_mode,
        }
    }
}
