// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! SQTPM deployment reconciler
//!
//! Maps assignment directories and password files into the grading
//! container's document root, one invocation at a time, without losing the
//! mappings of earlier invocations.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, pipeline stages and container adapters

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
