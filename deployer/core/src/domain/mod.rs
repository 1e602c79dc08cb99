// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain model
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Value objects, persisted state, runtime seams and errors

pub mod mapping;
pub mod deployment_state;
pub mod deploy_config;
pub mod path_sanitizer;
pub mod volume;
pub mod runtime;
pub mod symlink;
