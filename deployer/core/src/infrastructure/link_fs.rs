// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Link filesystem adapters
//!
//! [`ContainerLinkFilesystem`] works inside the service container through the
//! runtime's exec, each call bounded by the command timeout;
//! [`LocalLinkFilesystem`] works on a directory of the host.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::runtime::{ContainerRuntime, ExecOutput};
use crate::domain::symlink::{LinkEntry, LinkError, LinkFilesystem};

// ============================================================================
// Host filesystem
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct LocalLinkFilesystem;

impl LocalLinkFilesystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LinkFilesystem for LocalLinkFilesystem {
    async fn inspect(&self, path: &Path) -> Result<LinkEntry, LinkError> {
        let metadata = match tokio::fs::symlink_metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LinkEntry::Absent),
            Err(e) => return Err(LinkError::from_io(path, e)),
        };

        if !metadata.file_type().is_symlink() {
            return Ok(LinkEntry::Other);
        }

        let target = tokio::fs::read_link(path)
            .await
            .map_err(|e| LinkError::from_io(path, e))?;
        // metadata() follows the link
        let target_exists = tokio::fs::metadata(path).await.is_ok();
        Ok(LinkEntry::Symlink { target, target_exists })
    }

    async fn create_symlink(&self, target: &Path, link: &Path) -> Result<(), LinkError> {
        #[cfg(unix)]
        {
            tokio::fs::symlink(target, link)
                .await
                .map_err(|e| LinkError::from_io(link, e))
        }

        #[cfg(not(unix))]
        {
            let _ = target;
            Err(LinkError::Io {
                path: link.to_path_buf(),
                message: "symbolic links are only supported on Unix hosts".to_string(),
            })
        }
    }

    async fn remove_link(&self, link: &Path) -> Result<(), LinkError> {
        match self.inspect(link).await? {
            LinkEntry::Symlink { .. } => tokio::fs::remove_file(link)
                .await
                .map_err(|e| LinkError::from_io(link, e)),
            LinkEntry::Absent => Ok(()),
            LinkEntry::Other => Err(LinkError::Conflict {
                path: link.to_path_buf(),
            }),
        }
    }
}

// ============================================================================
// Inside the container
// ============================================================================

/// Prints `absent`, `other` or `link <0|1> <target>` for the path in `$1`.
const INSPECT_SCRIPT: &str = r#"if [ -L "$1" ]; then if [ -e "$1" ]; then e=1; else e=0; fi; printf 'link %s %s' "$e" "$(readlink "$1")"; elif [ -e "$1" ]; then printf other; else printf absent; fi"#;

/// Removes `$1` only if it is a link; exits 3 when something else is there.
const REMOVE_SCRIPT: &str = r#"if [ -L "$1" ]; then rm -f "$1"; elif [ -e "$1" ]; then exit 3; fi"#;

pub struct ContainerLinkFilesystem {
    runtime: Arc<dyn ContainerRuntime>,
    container: String,
    command_timeout: Duration,
}

impl ContainerLinkFilesystem {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, container: impl Into<String>, command_timeout: Duration) -> Self {
        Self {
            runtime,
            container: container.into(),
            command_timeout,
        }
    }

    async fn run(&self, path: &Path, cmd: Vec<String>) -> Result<ExecOutput, LinkError> {
        tokio::time::timeout(self.command_timeout, self.runtime.exec(&self.container, cmd))
            .await
            .map_err(|_| LinkError::Io {
                path: path.to_path_buf(),
                message: format!("timed out after {:?}", self.command_timeout),
            })?
            .map_err(|e| LinkError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    fn script(script: &str, path: &Path) -> Vec<String> {
        vec![
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
            "sh".to_string(),
            path.display().to_string(),
        ]
    }
}

fn parse_inspect_output(path: &Path, stdout: &str) -> Result<LinkEntry, LinkError> {
    let stdout = stdout.trim_end_matches('\n');
    match stdout {
        "absent" => Ok(LinkEntry::Absent),
        "other" => Ok(LinkEntry::Other),
        _ => {
            let rest = stdout.strip_prefix("link ").ok_or_else(|| LinkError::Io {
                path: path.to_path_buf(),
                message: format!("unexpected inspect output: {:?}", stdout),
            })?;
            let (exists, target) = rest.split_once(' ').unwrap_or((rest, ""));
            Ok(LinkEntry::Symlink {
                target: PathBuf::from(target),
                target_exists: exists == "1",
            })
        }
    }
}

fn exec_failure(path: &Path, output: &ExecOutput) -> LinkError {
    if output.stderr.contains("Permission denied") || output.stderr.contains("Read-only file system") {
        LinkError::PermissionDenied {
            path: path.to_path_buf(),
        }
    } else {
        LinkError::Io {
            path: path.to_path_buf(),
            message: format!("exit code {}: {}", output.exit_code, output.stderr.trim()),
        }
    }
}

#[async_trait]
impl LinkFilesystem for ContainerLinkFilesystem {
    async fn inspect(&self, path: &Path) -> Result<LinkEntry, LinkError> {
        let output = self.run(path, Self::script(INSPECT_SCRIPT, path)).await?;
        if !output.success() {
            return Err(exec_failure(path, &output));
        }
        parse_inspect_output(path, &output.stdout)
    }

    async fn create_symlink(&self, target: &Path, link: &Path) -> Result<(), LinkError> {
        let cmd = vec![
            "ln".to_string(),
            "-s".to_string(),
            target.display().to_string(),
            link.display().to_string(),
        ];
        let output = self.run(link, cmd).await?;
        if output.success() {
            Ok(())
        } else {
            Err(exec_failure(link, &output))
        }
    }

    async fn remove_link(&self, link: &Path) -> Result<(), LinkError> {
        let output = self.run(link, Self::script(REMOVE_SCRIPT, link)).await?;
        match output.exit_code {
            0 => Ok(()),
            3 => Err(LinkError::Conflict {
                path: link.to_path_buf(),
            }),
            _ => Err(exec_failure(link, &output)),
        }
    }
}
