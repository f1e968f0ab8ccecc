// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::ResultSet;
use crate::{errors::TransitionParseError, status::TestStatus};
use camino::{Utf8Path, Utf8PathBuf};
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    str::FromStr,
};

/// A change from one status to another, written `FROM->TO`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct StatusTransition {
    /// The status in the older set.
    pub from: TestStatus,
    /// The status in the newer set.
    pub to: TestStatus,
}

impl StatusTransition {
    /// Creates a new transition.
    pub fn new(from: TestStatus, to: TestStatus) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for StatusTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}

impl FromStr for StatusTransition {
    type Err = TransitionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid_status = |error| TransitionParseError::InvalidStatus {
            input: s.to_owned(),
            error,
        };

        let mut parts = s.split("->");
        let (Some(from), Some(to), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(TransitionParseError::InvalidFormat {
                input: s.to_owned(),
            });
        };
        let from = from.trim().parse().map_err(invalid_status)?;
        let to = to.trim().parse().map_err(invalid_status)?;
        Ok(Self { from, to })
    }
}

/// Parses a comma-separated list of transitions, e.g. `PASS->FAIL, CRASH->PASS`.
pub fn parse_transition_filter(input: &str) -> Result<Vec<StatusTransition>, TransitionParseError> {
    input.split(',').map(str::parse).collect()
}

/// The tests whose status changed between two result sets, grouped by transition.
///
/// Only paths present in both sets with different statuses appear. Within a transition, paths
/// are sorted.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Diff {
    buckets: BTreeMap<StatusTransition, Vec<Utf8PathBuf>>,
}

impl Diff {
    /// Returns the paths for a transition, or an empty slice.
    pub fn get(&self, transition: StatusTransition) -> &[Utf8PathBuf] {
        self.buckets
            .get(&transition)
            .map_or(&[], |paths| paths.as_slice())
    }

    /// Iterates over non-empty transitions in `(from, to)` order.
    pub fn iter(&self) -> impl Iterator<Item = (StatusTransition, &[Utf8PathBuf])> + '_ {
        self.buckets
            .iter()
            .map(|(transition, paths)| (*transition, paths.as_slice()))
    }

    /// Returns true if no test changed status.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Returns the total number of changed tests.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Returns the requested transitions, in the order they were requested.
    ///
    /// Transitions with no changed tests are omitted.
    pub fn filter<'a>(
        &'a self,
        transitions: &'a [StatusTransition],
    ) -> impl Iterator<Item = (StatusTransition, &'a [Utf8PathBuf])> + 'a {
        transitions.iter().filter_map(|transition| {
            self.buckets
                .get(transition)
                .map(|paths| (*transition, paths.as_slice()))
        })
    }

    /// Returns the diff with `from` and `to` swapped in every transition.
    pub fn inverted(&self) -> Diff {
        let buckets = self
            .buckets
            .iter()
            .map(|(transition, paths)| {
                (
                    StatusTransition::new(transition.to, transition.from),
                    paths.clone(),
                )
            })
            .collect();
        Diff { buckets }
    }
}

/// Computes the status changes from `old` to `new`.
///
/// A path changed if it appears in both sets with different statuses. It is recorded under
/// `(status in old, status in new)`.
pub fn compute_diff(old: &ResultSet, new: &ResultSet) -> Diff {
    let old_status: HashMap<&Utf8Path, TestStatus> = old
        .results()
        .iter()
        .map(|result| (result.path.as_path(), result.status))
        .collect();

    let mut buckets: BTreeMap<StatusTransition, Vec<Utf8PathBuf>> = BTreeMap::new();
    for result in new.results() {
        if let Some(&from) = old_status.get(result.path.as_path()) {
            if from != result.status {
                buckets
                    .entry(StatusTransition::new(from, result.status))
                    .or_default()
                    .push(result.path.clone());
            }
        }
    }

    for paths in buckets.values_mut() {
        paths.sort_unstable();
        paths.dedup();
    }

    Diff { buckets }
}
