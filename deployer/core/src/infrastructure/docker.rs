// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, LogOutput};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::Docker;
use futures::StreamExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::runtime::{ComposeUpRequest, ContainerError, ContainerRuntime, ContainerState, ExecOutput};

/// Docker Engine for inspect/exec, compose CLI for bringing the service up.
///
/// Docker cannot change the mounts of a running container, so this runtime
/// keeps the default `supports_live_mounts() == false`.
pub struct DockerComposeRuntime {
    docker: Docker,
    compose_command: Vec<String>,
}

impl DockerComposeRuntime {
    pub fn new(compose_command: Vec<String>, socket_path: Option<String>) -> Result<Self, ContainerError> {
        if compose_command.is_empty() {
            return Err(ContainerError::Unreachable("empty compose command".to_string()));
        }

        let docker = if let Some(path) = socket_path {
            #[cfg(unix)]
            let result = Docker::connect_with_unix(&path, 120, bollard::API_DEFAULT_VERSION);

            #[cfg(windows)]
            let result = Docker::connect_with_named_pipe(&path, 120, bollard::API_DEFAULT_VERSION);

            result.map_err(|e| {
                ContainerError::Unreachable(format!(
                    "Failed to connect to Docker at {}: {}\n\n\
                     Ensure Docker is running and the socket path is correct.",
                    path, e
                ))
            })?
        } else {
            Docker::connect_with_local_defaults().map_err(|e| {
                ContainerError::Unreachable(format!(
                    "Failed to connect to Docker: {}\n\n\
                     Common causes:\n\
                     - Docker daemon not running (check: docker ps)\n\
                     - Permission denied accessing Docker socket\n\
                     - Current user not in 'docker' group",
                    e
                ))
            })?
        };

        Ok(Self {
            docker,
            compose_command,
        })
    }

    fn compose_args(request: &ComposeUpRequest) -> Vec<String> {
        let mut args = Vec::new();
        for file in &request.files {
            args.push("-f".to_string());
            args.push(file.display().to_string());
        }
        args.push("up".to_string());
        args.push("-d".to_string());
        args.push(if request.build { "--build" } else { "--no-build" }.to_string());
        args.push(request.service.clone());
        args
    }
}

#[async_trait]
impl ContainerRuntime for DockerComposeRuntime {
    /// Verify Docker daemon is accessible
    async fn healthcheck(&self) -> Result<(), ContainerError> {
        self.docker.ping().await.map_err(|e| {
            ContainerError::Unreachable(format!(
                "Cannot connect to Docker daemon: {}\n\n\
                 Verify with: docker ps",
                e
            ))
        })?;
        Ok(())
    }

    async fn state(&self, container: &str) -> Result<ContainerState, ContainerError> {
        match self
            .docker
            .inspect_container(container, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => {
                let running = inspect.state.and_then(|s| s.running).unwrap_or(false);
                Ok(if running {
                    ContainerState::Running
                } else {
                    ContainerState::Stopped
                })
            }
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {
                Ok(ContainerState::Absent)
            }
            Err(e) => Err(ContainerError::Unreachable(e.to_string())),
        }
    }

    async fn compose_up(&self, request: &ComposeUpRequest) -> Result<(), ContainerError> {
        let program = which::which(&self.compose_command[0]).map_err(|e| {
            ContainerError::Unreachable(format!("{} not found on PATH: {}", self.compose_command[0], e))
        })?;

        let mut args: Vec<String> = self.compose_command[1..].to_vec();
        args.extend(Self::compose_args(request));
        let rendered = format!("{} {}", self.compose_command[0], args.join(" "));
        info!("Running: {}", rendered);

        let output = Command::new(program)
            .args(&args)
            .current_dir(&request.project_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ContainerError::CommandFailed {
                command: rendered.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ContainerError::CommandFailed {
                command: rendered,
                message: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        debug!("{} finished", rendered);
        Ok(())
    }

    async fn exec(&self, container: &str, cmd: Vec<String>) -> Result<ExecOutput, ContainerError> {
        let rendered = cmd.join(" ");
        let failed = |message: String| ContainerError::CommandFailed {
            command: format!("docker exec {} {}", container, rendered),
            message,
        };

        let exec_config = CreateExecOptions {
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            cmd: Some(cmd),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(container, exec_config)
            .await
            .map_err(|e| failed(e.to_string()))?;

        let start_opts = StartExecOptions {
            detach: false,
            ..Default::default()
        };

        let res = self
            .docker
            .start_exec(&exec.id, Some(start_opts))
            .await
            .map_err(|e| failed(e.to_string()))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = res {
            while let Some(msg) = output.next().await {
                match msg {
                    Ok(LogOutput::StdOut { message }) => stdout.push_str(&String::from_utf8_lossy(&message)),
                    Ok(LogOutput::StdErr { message }) => stderr.push_str(&String::from_utf8_lossy(&message)),
                    Ok(_) => {}
                    Err(e) => return Err(failed(e.to_string())),
                }
            }
        }

        let exec_inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| failed(format!("Failed to inspect exec: {}", e)))?;

        Ok(ExecOutput {
            exit_code: exec_inspect.exit_code.unwrap_or(0),
            stdout,
            stderr,
        })
    }
}
