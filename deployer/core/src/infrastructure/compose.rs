// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Compose override file
//!
//! The override only declares bind volumes for the web service; compose
//! merges it over the project's base file. It is regenerated in full on every
//! deploy and never edited by hand.
//!
//! A sibling `.applied` marker holds the override content the container was
//! last successfully brought up with. The override on disk may be ahead of
//! the container after a failed `compose up`; the marker never is.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::runtime::ContainerError;
use crate::domain::volume::VolumePlan;

const OVERRIDE_HEADER: &str = "# Generated by sqtpm-deploy. Do not edit: rewritten on every deploy.\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeOverride {
    pub services: BTreeMap<String, ServiceOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOverride {
    pub volumes: Vec<BindVolume>,
}

/// Long-form compose volume (`type: bind`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindVolume {
    #[serde(rename = "type")]
    pub volume_type: String,
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

impl ComposeOverride {
    pub fn from_plan(service: &str, plan: &VolumePlan) -> Self {
        let volumes = plan
            .entries()
            .iter()
            .map(|entry| BindVolume {
                volume_type: "bind".to_string(),
                source: entry.host_path.display().to_string(),
                target: entry.container_path.display().to_string(),
                read_only: !entry.mode.is_writable(),
            })
            .collect();

        let mut services = BTreeMap::new();
        services.insert(service.to_string(), ServiceOverride { volumes });
        Self { services }
    }

    pub fn render(&self) -> Result<String, serde_yaml::Error> {
        Ok(format!("{}{}", OVERRIDE_HEADER, serde_yaml::to_string(self)?))
    }
}

/// Replace the override file with `content`.
///
/// Returns whether the content on disk changed. Unchanged files are left
/// untouched so their mtime stays meaningful.
pub fn write_override(path: &Path, content: &str) -> Result<bool, ContainerError> {
    let write_err = |message: String| ContainerError::OverrideWrite {
        path: path.to_path_buf(),
        message,
    };

    match std::fs::read_to_string(path) {
        Ok(existing) if existing == content => {
            debug!("Override {} already up to date", path.display());
            return Ok(false);
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(write_err(e.to_string())),
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| write_err(e.to_string()))?;
    temp.write_all(content.as_bytes())
        .map_err(|e| write_err(e.to_string()))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| write_err(e.to_string()))?;
    temp.persist(path).map_err(|e| write_err(e.error.to_string()))?;

    info!("Wrote compose override {}", path.display());
    Ok(true)
}

/// `<override>.applied`
pub fn applied_marker_path(override_path: &Path) -> PathBuf {
    let mut name = override_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".applied");
    override_path.with_file_name(name)
}

/// Whether the container was last brought up with exactly `content`.
pub fn is_applied(override_path: &Path, content: &str) -> bool {
    match std::fs::read_to_string(applied_marker_path(override_path)) {
        Ok(applied) => applied == content,
        Err(_) => false,
    }
}

/// Record `content` as applied. Call only once the container runs with it.
pub fn mark_applied(override_path: &Path, content: &str) -> Result<(), ContainerError> {
    write_override(&applied_marker_path(override_path), content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::volume::{AccessMode, ResourceKind, VolumePlanEntry};

    fn plan() -> VolumePlan {
        let mut plan = VolumePlan::new();
        plan.push(VolumePlanEntry::new(
            PathBuf::from("/work/hw1"),
            PathBuf::from("/usr/local/apache2/htdocs/hw1"),
            AccessMode::ReadWrite,
            ResourceKind::AssignmentDirectory,
        ));
        plan.push(VolumePlanEntry::new(
            PathBuf::from("/work/sqtpm.cfg"),
            PathBuf::from("/usr/local/apache2/htdocs/sqtpm.cfg"),
            AccessMode::ReadOnly,
            ResourceKind::ConfigFile,
        ));
        plan
    }

    #[test]
    fn test_render_long_form_binds() {
        let rendered = ComposeOverride::from_plan("sqtpm-web", &plan()).render().unwrap();
        assert!(rendered.starts_with("# Generated by sqtpm-deploy"));

        let parsed: ComposeOverride =
            serde_yaml::from_str(rendered.trim_start_matches(OVERRIDE_HEADER)).unwrap();
        let volumes = &parsed.services["sqtpm-web"].volumes;
        assert_eq!(volumes.len(), 2);
        assert_eq!(volumes[0].volume_type, "bind");
        assert_eq!(volumes[0].source, "/work/hw1");
        assert!(!volumes[0].read_only);
        assert!(volumes[1].read_only);
    }

    #[test]
    fn test_write_reports_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docker-compose.deploy.yml");
        let content = ComposeOverride::from_plan("sqtpm-web", &plan()).render().unwrap();

        assert!(write_override(&path, &content).unwrap());
        assert!(!write_override(&path, &content).unwrap());
        assert!(write_override(&path, "services: {}\n").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "services: {}\n");
    }

    #[test]
    fn test_written_override_is_not_applied_until_marked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docker-compose.deploy.yml");
        let content = ComposeOverride::from_plan("sqtpm-web", &plan()).render().unwrap();

        write_override(&path, &content).unwrap();
        assert!(!is_applied(&path, &content));

        mark_applied(&path, &content).unwrap();
        assert!(is_applied(&path, &content));
        assert!(dir.path().join("docker-compose.deploy.yml.applied").exists());
        assert!(!is_applied(&path, "services: {}\n"));
    }
}
