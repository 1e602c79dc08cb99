// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Permission fix and web server reload
//!
//! Both steps run inside the container after the links are in place. Neither
//! can fail a deploy: problems, including a step outliving the command
//! timeout, come back as warnings.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::runtime::{ContainerRuntime, ExecOutput};

const RELOAD_COMMAND: &str = "pkill -HUP httpd || true";

pub struct PermissionFixer {
    runtime: Arc<dyn ContainerRuntime>,
    container: String,
    server_root: String,
    script: String,
    command_timeout: Duration,
}

impl PermissionFixer {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        container: impl Into<String>,
        server_root: impl Into<String>,
        script: impl Into<String>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            runtime,
            container: container.into(),
            server_root: server_root.into(),
            script: script.into(),
            command_timeout,
        }
    }

    fn script_command(&self) -> Vec<String> {
        let root = self.server_root.trim_end_matches('/');
        vec![
            "sh".to_string(),
            format!("{}/{}", root, self.script.trim_start_matches('/')),
            root.to_string(),
        ]
    }

    /// Run the permission script, then ask the web server to reload.
    /// Returns the warnings collected along the way.
    pub async fn run(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(warning) = self.exec_step("permission fix", self.script_command()).await {
            warnings.push(warning);
        }

        let reload = vec!["sh".to_string(), "-c".to_string(), RELOAD_COMMAND.to_string()];
        if let Some(warning) = self.exec_step("web server reload", reload).await {
            warnings.push(warning);
        }

        warnings
    }

    async fn exec_step(&self, step: &str, cmd: Vec<String>) -> Option<String> {
        let rendered = cmd.join(" ");
        let exec = tokio::time::timeout(self.command_timeout, self.runtime.exec(&self.container, cmd));
        let warning = match exec.await {
            Err(_) => format!("{} `{}` timed out after {:?}", step, rendered, self.command_timeout),
            Ok(Ok(ExecOutput { exit_code: 0, .. })) => {
                info!("{} done ({})", step, rendered);
                return None;
            }
            Ok(Ok(output)) => format!(
                "{} `{}` exited with {}: {}",
                step,
                rendered,
                output.exit_code,
                output.stderr.trim()
            ),
            Ok(Err(e)) => format!("{} `{}` could not run: {}", step, rendered, e),
        };
        warn!("{}", warning);
        Some(warning)
    }
}
