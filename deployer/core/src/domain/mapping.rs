// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Assignment ↔ password-file mapping
//!
//! The mapping is the heart of the deployment state: each assignment name
//! appears once and owns a set of password files. Merges are unions, so a
//! deploy never forgets what an earlier deploy mapped.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::domain::path_sanitizer::{PathSanitizer, PathSanitizerError};

// ============================================================================
// Value Objects
// ============================================================================

/// Name of an assignment directory served under the document root
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssignmentName(String);

impl AssignmentName {
    pub fn new(name: impl Into<String>) -> Result<Self, PathSanitizerError> {
        let name = name.into();
        PathSanitizer::new().validate_segment(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Name of a credentials file, relative to the source root
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PasswordFileRef(String);

impl PasswordFileRef {
    pub fn new(name: impl Into<String>) -> Result<Self, PathSanitizerError> {
        let name = name.into();
        PathSanitizer::new().validate_segment(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! string_newtype_impls {
    ($ty:ident) => {
        impl TryFrom<String> for $ty {
            type Error = PathSanitizerError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_newtype_impls!(AssignmentName);
string_newtype_impls!(PasswordFileRef);

// ============================================================================
// Candidate entries
// ============================================================================

/// Normalized input of one invocation, ready to merge into the mapping.
///
/// `assignments` lists every assignment that was mentioned, including the ones
/// without credentials; `pairs` holds the (assignment, password file)
/// associations. Both keep first-seen order and contain no duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSet {
    pub assignments: Vec<AssignmentName>,
    pub pairs: Vec<(AssignmentName, PasswordFileRef)>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_assignment(&mut self, assignment: AssignmentName) {
        if !self.assignments.contains(&assignment) {
            self.assignments.push(assignment);
        }
    }

    pub fn add_pair(&mut self, assignment: AssignmentName, pass_file: PasswordFileRef) {
        self.add_assignment(assignment.clone());
        let pair = (assignment, pass_file);
        if !self.pairs.contains(&pair) {
            self.pairs.push(pair);
        }
    }

    /// Fold another candidate set into this one, keeping first-seen order.
    pub fn extend(&mut self, other: CandidateSet) {
        for assignment in other.assignments {
            self.add_assignment(assignment);
        }
        for (assignment, pass_file) in other.pairs {
            self.add_pair(assignment, pass_file);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

// ============================================================================
// Aggregate: Mapping
// ============================================================================

/// What a merge or removal actually changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MappingDelta {
    pub assignments: usize,
    pub pass_files: usize,
}

impl MappingDelta {
    pub fn is_empty(&self) -> bool {
        self.assignments == 0 && self.pass_files == 0
    }
}

/// Persisted assignment → password-file table
///
/// Keys and sets are sorted, which keeps the store file and every artefact
/// derived from it stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mapping(BTreeMap<AssignmentName, BTreeSet<PasswordFileRef>>);

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union the candidates into the mapping. Commutative and idempotent.
    pub fn merge(&mut self, candidates: &CandidateSet) -> MappingDelta {
        let mut delta = MappingDelta::default();

        for assignment in &candidates.assignments {
            if !self.0.contains_key(assignment) {
                self.0.insert(assignment.clone(), BTreeSet::new());
                delta.assignments += 1;
            }
        }

        for (assignment, pass_file) in &candidates.pairs {
            let files = self.0.entry(assignment.clone()).or_insert_with(|| {
                delta.assignments += 1;
                BTreeSet::new()
            });
            if files.insert(pass_file.clone()) {
                delta.pass_files += 1;
            }
        }

        delta
    }

    /// Explicit removal: a pair drops that file from the assignment, a bare
    /// assignment (mentioned without any pair) drops the whole entry.
    pub fn remove(&mut self, candidates: &CandidateSet) -> MappingDelta {
        let mut delta = MappingDelta::default();

        for (assignment, pass_file) in &candidates.pairs {
            if let Some(files) = self.0.get_mut(assignment) {
                if files.remove(pass_file) {
                    delta.pass_files += 1;
                }
            }
        }

        for assignment in &candidates.assignments {
            let has_pairs = candidates.pairs.iter().any(|(a, _)| a == assignment);
            if has_pairs {
                continue;
            }
            if let Some(files) = self.0.remove(assignment) {
                delta.assignments += 1;
                delta.pass_files += files.len();
            }
        }

        delta
    }

    pub fn get(&self, assignment: &AssignmentName) -> Option<&BTreeSet<PasswordFileRef>> {
        self.0.get(assignment)
    }

    pub fn contains(&self, assignment: &AssignmentName) -> bool {
        self.0.contains_key(assignment)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AssignmentName, &BTreeSet<PasswordFileRef>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every password file referenced by at least one assignment
    pub fn pass_files(&self) -> BTreeSet<&PasswordFileRef> {
        self.0.values().flatten().collect()
    }
}
