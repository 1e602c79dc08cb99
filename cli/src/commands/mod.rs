// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the sqtpm-deploy CLI

pub mod config;
pub mod deploy;

pub use self::deploy::DeployArgs;
