// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod compose;
pub mod docker;
pub mod link_fs;

pub use docker::DockerComposeRuntime;
pub use link_fs::{ContainerLinkFilesystem, LocalLinkFilesystem};
