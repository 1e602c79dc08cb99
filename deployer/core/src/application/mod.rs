// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod input_parser;
pub mod mapping_store;
pub mod volume_plan;
pub mod container_controller;
pub mod symlink_reconciler;
pub mod permission_fixer;
pub mod deploy;

// Re-export pipeline entry points for convenience
pub use deploy::{DeployService, DeployRequest, DeployReport, DeployError, ValidationOrder};
pub use mapping_store::{MappingStore, PersistenceError};
pub use input_parser::{CandidateSet, ParseError};
pub use volume_plan::{VolumePlanBuilder, VolumePlanError};
