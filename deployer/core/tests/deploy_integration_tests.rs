// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the deploy pipeline
//!
//! These tests verify:
//! 1. Pair expressions end up in the store, the compose override and the links
//! 2. Re-running a converged deploy changes nothing
//! 3. Missing host paths abort before the container is touched, in both
//!    validation orders
//! 4. Explicit removals and non-link entries in the served root
//! 5. Container-stage failures (unreachable daemon, failing or slow compose
//!    up, hanging exec) keep the saved mapping and converge on retry
//!
//! The container runtime is mocked; links are reconciled on a host directory
//! standing in for the served root.

use async_trait::async_trait;
use sqtpm_deploy_core::application::input_parser::parse_pair_expressions;
use sqtpm_deploy_core::application::mapping_store::DEFAULT_STATE_FILE;
use sqtpm_deploy_core::application::{DeployError, DeployRequest, DeployService, MappingStore, ValidationOrder};
use sqtpm_deploy_core::domain::deploy_config::RuntimeSettings;
use sqtpm_deploy_core::domain::deployment_state::BuildMode;
use sqtpm_deploy_core::domain::mapping::AssignmentName;
use sqtpm_deploy_core::domain::runtime::{
    ApplyStrategy, ComposeUpRequest, ContainerError, ContainerRuntime, ContainerState, ExecOutput,
};
use sqtpm_deploy_core::domain::volume::ResourceKind;
use sqtpm_deploy_core::infrastructure::LocalLinkFilesystem;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// Mock container runtime: starts the container on compose up, records calls
struct MockRuntime {
    state: Mutex<ContainerState>,
    reachable: Mutex<bool>,
    /// compose up calls left to fail
    failing_ups: Mutex<usize>,
    up_delay: Duration,
    hang_exec: bool,
    compose_ups: Mutex<Vec<ComposeUpRequest>>,
    execs: Mutex<Vec<Vec<String>>>,
}

impl MockRuntime {
    fn new() -> Self {
        Self {
            state: Mutex::new(ContainerState::Absent),
            reachable: Mutex::new(true),
            failing_ups: Mutex::new(0),
            up_delay: Duration::ZERO,
            hang_exec: false,
            compose_ups: Mutex::new(Vec::new()),
            execs: Mutex::new(Vec::new()),
        }
    }

    fn compose_up_count(&self) -> usize {
        self.compose_ups.lock().unwrap().len()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn healthcheck(&self) -> Result<(), ContainerError> {
        if *self.reachable.lock().unwrap() {
            Ok(())
        } else {
            Err(ContainerError::Unreachable("connection refused".to_string()))
        }
    }

    async fn state(&self, _container: &str) -> Result<ContainerState, ContainerError> {
        Ok(*self.state.lock().unwrap())
    }

    async fn compose_up(&self, request: &ComposeUpRequest) -> Result<(), ContainerError> {
        self.compose_ups.lock().unwrap().push(request.clone());
        if !self.up_delay.is_zero() {
            tokio::time::sleep(self.up_delay).await;
        }
        {
            let mut failing = self.failing_ups.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(ContainerError::CommandFailed {
                    command: "docker compose up".to_string(),
                    message: "network sqtpm_default not found".to_string(),
                });
            }
        }
        *self.state.lock().unwrap() = ContainerState::Running;
        Ok(())
    }

    async fn exec(&self, _container: &str, cmd: Vec<String>) -> Result<ExecOutput, ContainerError> {
        self.execs.lock().unwrap().push(cmd);
        if self.hang_exec {
            std::future::pending::<()>().await;
        }
        Ok(ExecOutput::default())
    }
}

struct Fixture {
    work: TempDir,
    served: TempDir,
    runtime: Arc<MockRuntime>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_runtime(MockRuntime::new())
    }

    fn with_runtime(runtime: MockRuntime) -> Self {
        let work = tempfile::tempdir().unwrap();
        let served = tempfile::tempdir().unwrap();
        for assignment in ["hw1", "hw2", "hw3"] {
            fs::create_dir(work.path().join(assignment)).unwrap();
            // stands in for the bind mount of the assignment directory
            fs::create_dir(served.path().join(assignment)).unwrap();
        }
        fs::write(work.path().join("users.pass"), "alice:$1$abc\n").unwrap();
        fs::write(work.path().join("admins.pass"), "root:$1$def\n").unwrap();

        Self {
            work,
            served,
            runtime: Arc::new(runtime),
        }
    }

    fn store_path(&self) -> std::path::PathBuf {
        self.work.path().join(DEFAULT_STATE_FILE)
    }

    fn override_path(&self) -> std::path::PathBuf {
        self.work.path().join("docker-compose.deploy.yml")
    }

    fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            server_root: self.served.path().display().to_string(),
            ready_timeout_secs: 1,
            ..RuntimeSettings::default()
        }
    }

    fn service(&self) -> DeployService {
        self.service_with(self.runtime_settings())
            .with_link_filesystem(Arc::new(LocalLinkFilesystem::new()))
    }

    /// Links go through the runtime's exec, like in production
    fn service_with(&self, runtime_settings: RuntimeSettings) -> DeployService {
        DeployService::new(
            self.runtime.clone(),
            MappingStore::new(self.store_path()),
            self.work.path(),
            runtime_settings,
        )
    }

    fn saved_assignments(&self) -> Vec<String> {
        MappingStore::new(self.store_path())
            .load()
            .unwrap()
            .assignments
            .iter()
            .map(|(assignment, _)| assignment.to_string())
            .collect()
    }

    fn request(&self, pairs: &[&str]) -> DeployRequest {
        DeployRequest {
            candidates: parse_pair_expressions(pairs.iter().copied()).unwrap(),
            ..DeployRequest::default()
        }
    }

    fn link_target(&self, assignment: &str, pass_file: &str) -> Option<String> {
        fs::read_link(self.served.path().join(assignment).join(pass_file))
            .ok()
            .map(|p| p.display().to_string())
    }
}

#[tokio::test]
async fn test_first_deploy_maps_and_links() {
    let fx = Fixture::new();

    let report = fx.service().deploy(fx.request(&["hw1,hw2:users.pass"])).await.unwrap();

    assert_eq!(report.apply.strategy, ApplyStrategy::Start);
    assert_eq!(report.build_mode, BuildMode::Rebuild);
    assert_eq!(report.container, "sqtpm-sqtpm-web-1");
    assert_eq!(report.links.created.len(), 2);
    assert!(report.is_clean(), "warnings: {:?}", report.warnings);

    // hw1, users.pass, hw2
    assert_eq!(report.plan.len(), 3);
    assert!(fx.override_path().exists());
    assert!(fx.store_path().exists());
    assert_eq!(fx.link_target("hw1", "users.pass").as_deref(), Some("../users.pass"));
    assert_eq!(fx.link_target("hw2", "users.pass").as_deref(), Some("../users.pass"));

    let ups = fx.runtime.compose_ups.lock().unwrap();
    assert!(ups[0].build);
    assert_eq!(ups[0].project_dir, fx.work.path());

    // permission fix then reload
    let execs = fx.runtime.execs.lock().unwrap();
    assert_eq!(execs.len(), 2);
    assert!(execs[0][1].ends_with("Utils/fix-perms.sh"));
}

#[tokio::test]
async fn test_rerun_with_reuse_is_a_no_op() {
    let fx = Fixture::new();
    let service = fx.service();
    service.deploy(fx.request(&["hw1:users.pass"])).await.unwrap();

    let mut request = fx.request(&["hw1:users.pass"]);
    request.build_mode = Some(BuildMode::Reuse);
    let report = service.deploy(request).await.unwrap();

    assert_eq!(report.apply.strategy, ApplyStrategy::Reuse);
    assert!(!report.apply.mounts_changed);
    assert!(report.added.is_empty());
    assert_eq!(report.links.mutations(), 0);
    assert_eq!(report.links.unchanged.len(), 1);
    assert_eq!(fx.runtime.compose_up_count(), 1);
}

#[tokio::test]
async fn test_later_invocations_merge() {
    let fx = Fixture::new();
    let service = fx.service();

    service.deploy(fx.request(&["hw1:users.pass"])).await.unwrap();
    let report = service.deploy(fx.request(&["hw1:admins.pass"])).await.unwrap();

    let files: Vec<&str> = report
        .mapping
        .get(&AssignmentName::new("hw1").unwrap())
        .unwrap()
        .iter()
        .map(|f| f.as_str())
        .collect();
    assert_eq!(files, vec!["admins.pass", "users.pass"]);
    assert_eq!(report.links.created.len(), 1);
    assert_eq!(report.links.unchanged.len(), 1);

    // the first link survived the second run
    assert_eq!(fx.link_target("hw1", "users.pass").as_deref(), Some("../users.pass"));
    assert_eq!(fx.link_target("hw1", "admins.pass").as_deref(), Some("../admins.pass"));
}

#[tokio::test]
async fn test_missing_directory_persist_then_validate() {
    let fx = Fixture::new();

    let err = fx.service().deploy(fx.request(&["hw9:users.pass"])).await.unwrap_err();

    match err {
        DeployError::MissingResource(missing) => {
            assert_eq!(missing.kind, ResourceKind::AssignmentDirectory);
            assert_eq!(missing.path, fx.work.path().join("hw9"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!fx.override_path().exists());
    assert_eq!(fx.runtime.compose_up_count(), 0);

    // recorded anyway, so it can be inspected and removed
    let state = MappingStore::new(fx.store_path()).load().unwrap();
    assert!(state.assignments.contains(&AssignmentName::new("hw9").unwrap()));
}

#[tokio::test]
async fn test_missing_directory_validate_then_persist() {
    let fx = Fixture::new();
    let mut request = fx.request(&["hw9:users.pass"]);
    request.validation_order = ValidationOrder::ValidateThenPersist;

    let err = fx.service().deploy(request).await.unwrap_err();

    assert!(matches!(err, DeployError::MissingResource(_)));
    assert!(!fx.override_path().exists());
    assert!(!fx.store_path().exists());
    assert_eq!(fx.runtime.compose_up_count(), 0);
}

#[tokio::test]
async fn test_removal_recovers_from_bad_entry() {
    let fx = Fixture::new();
    let service = fx.service();
    assert!(service.deploy(fx.request(&["hw1:users.pass", "hw9"])).await.is_err());

    let mut request = fx.request(&[]);
    request.removals = parse_pair_expressions(["hw9"]).unwrap();
    let report = service.deploy(request).await.unwrap();

    assert_eq!(report.removed.assignments, 1);
    assert_eq!(report.mapping.len(), 1);
    assert!(report.mapping.contains(&AssignmentName::new("hw1").unwrap()));
}

#[tokio::test]
async fn test_regular_file_in_the_way_is_kept() {
    let fx = Fixture::new();
    let occupant = fx.served.path().join("hw3").join("users.pass");
    fs::write(&occupant, "not a link").unwrap();

    let report = fx
        .service()
        .deploy(fx.request(&["hw2,hw3:users.pass"]))
        .await
        .unwrap();

    assert_eq!(report.links.failures.len(), 1);
    assert_eq!(report.links.failures[0].path(), occupant.as_path());
    assert_eq!(report.links.created.len(), 1);
    assert!(!report.is_clean());
    assert_eq!(fs::read_to_string(&occupant).unwrap(), "not a link");
    assert!(Path::new(&fx.served.path().join("hw2").join("users.pass")).is_symlink());
}

#[tokio::test]
async fn test_unreachable_runtime_keeps_the_merge() {
    let fx = Fixture::new();
    *fx.runtime.reachable.lock().unwrap() = false;

    let err = fx.service().deploy(fx.request(&["hw1:users.pass"])).await.unwrap_err();

    assert!(matches!(err, DeployError::Container(ContainerError::Unreachable(_))));
    assert_eq!(fx.saved_assignments(), vec!["hw1"]);
    assert_eq!(fx.runtime.compose_up_count(), 0);

    // the daemon is back: only the new candidate needs naming
    *fx.runtime.reachable.lock().unwrap() = true;
    let report = fx.service().deploy(fx.request(&["hw2:users.pass"])).await.unwrap();
    assert_eq!(report.mapping.len(), 2);
    assert_eq!(fx.link_target("hw1", "users.pass").as_deref(), Some("../users.pass"));
}

#[tokio::test]
async fn test_failed_compose_up_converges_on_retry() {
    let fx = Fixture::new();
    let service = fx.service();
    service.deploy(fx.request(&["hw1:users.pass"])).await.unwrap();

    *fx.runtime.failing_ups.lock().unwrap() = 1;
    let mut request = fx.request(&["hw2:users.pass"]);
    request.build_mode = Some(BuildMode::Reuse);
    let err = service.deploy(request).await.unwrap_err();

    assert!(matches!(err, DeployError::Container(ContainerError::CommandFailed { .. })));
    assert_eq!(fx.saved_assignments(), vec!["hw1", "hw2"]);
    assert_eq!(fx.link_target("hw2", "users.pass"), None);

    // same invocation again, nothing new on the command line
    let mut retry = fx.request(&[]);
    retry.build_mode = Some(BuildMode::Reuse);
    let report = service.deploy(retry).await.unwrap();

    assert_eq!(report.apply.strategy, ApplyStrategy::Recreate);
    assert!(report.apply.mounts_changed);
    assert_eq!(fx.runtime.compose_up_count(), 3);
    assert!(!fx.runtime.compose_ups.lock().unwrap()[2].build);
    assert_eq!(fx.link_target("hw2", "users.pass").as_deref(), Some("../users.pass"));
}

#[tokio::test]
async fn test_slow_compose_up_times_out() {
    let mut runtime = MockRuntime::new();
    runtime.up_delay = Duration::from_secs(3);
    let fx = Fixture::with_runtime(runtime);
    let settings = RuntimeSettings {
        command_timeout_secs: 1,
        ..fx.runtime_settings()
    };
    let service = fx.service_with(settings).with_link_filesystem(Arc::new(LocalLinkFilesystem::new()));

    let err = service.deploy(fx.request(&["hw1:users.pass"])).await.unwrap_err();

    match err {
        DeployError::Container(ContainerError::Timeout { operation, after }) => {
            assert_eq!(operation, "compose up");
            assert_eq!(after, Duration::from_secs(1));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(fx.saved_assignments(), vec!["hw1"]);
    assert_eq!(fx.link_target("hw1", "users.pass"), None);
}

#[tokio::test]
async fn test_hanging_exec_ends_in_warnings() {
    let mut runtime = MockRuntime::new();
    runtime.hang_exec = true;
    let fx = Fixture::with_runtime(runtime);
    let settings = RuntimeSettings {
        command_timeout_secs: 1,
        ..fx.runtime_settings()
    };

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        fx.service_with(settings).deploy(fx.request(&["hw1:users.pass"])),
    )
    .await
    .expect("deploy should not hang")
    .unwrap();

    assert_eq!(report.apply.strategy, ApplyStrategy::Start);
    assert_eq!(report.links.failures.len(), 1);
    assert!(report.links.created.is_empty());
    // link inspect, permission fix, reload
    assert_eq!(fx.runtime.execs.lock().unwrap().len(), 3);
    assert_eq!(report.warnings.len(), 3);
    assert!(report.warnings.iter().all(|w| w.contains("timed out")));
}
