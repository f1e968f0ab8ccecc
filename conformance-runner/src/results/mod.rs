// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test results and the ordered sets they are collected into.
//!
//! The main structure in this module is [`ResultSet`].

mod diff;

pub use diff::*;

use crate::status::{StatusCounts, TestStatus};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

/// The outcome of running one test file.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// The status the engine's output and exit were classified as.
    pub status: TestStatus,

    /// The engine's combined output, or a harness-provided message.
    #[serde(rename = "msg")]
    pub message: String,

    /// The test file. Paths are unique within a [`ResultSet`].
    pub path: Utf8PathBuf,

    /// Peak resident memory in KiB, or 0 if it couldn't be measured.
    pub memory_kb: u64,

    /// Wall-clock time from spawn to completion.
    #[serde(with = "duration_nanos")]
    pub duration: Duration,
}

impl TestResult {
    /// The result recorded for a test excluded by skip policy.
    pub fn skipped(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            status: TestStatus::Skip,
            message: "skip".to_owned(),
            path: path.into(),
            memory_kb: 0,
            duration: Duration::ZERO,
        }
    }
}

/// Durations are stored as integer nanoseconds.
mod duration_nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(
        duration: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        serializer.serialize_u64(nanos)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        // Older files may contain negative values. Treat them as unknown.
        let nanos = i64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos.max(0) as u64))
    }
}

/// An ordered collection of test results, along with per-status counts.
///
/// Counts can always be re-derived from the results with [`analyze`](Self::analyze).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResultSet {
    results: Vec<TestResult>,
    counts: StatusCounts,
}

impl ResultSet {
    /// Creates an empty result set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty result set with room for `capacity` results.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            results: Vec::with_capacity(capacity),
            counts: StatusCounts::default(),
        }
    }

    /// Creates a result set from results loaded elsewhere, deriving the counts.
    pub fn from_results(results: Vec<TestResult>) -> Self {
        let mut set = Self {
            results,
            counts: StatusCounts::default(),
        };
        set.analyze();
        set
    }

    /// Appends a result and updates the counts.
    pub fn add(&mut self, result: TestResult) {
        self.counts[result.status] += 1;
        self.results.push(result);
    }

    /// Re-derives the counts from the results.
    pub fn analyze(&mut self) {
        let mut counts = StatusCounts::default();
        for result in &self.results {
            counts[result.status] += 1;
        }
        self.counts = counts;
    }

    /// Returns the results in order.
    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    /// Returns the per-status counts.
    pub fn counts(&self) -> &StatusCounts {
        &self.counts
    }

    /// Returns the number of results.
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Returns true if there are no results.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Looks up the result for a path.
    pub fn get(&self, path: &Utf8Path) -> Option<&TestResult> {
        self.results.iter().rev().find(|result| result.path == path)
    }

    /// Returns a path to status map, as used for progress deltas and failed-only reruns.
    pub fn status_by_path(&self) -> HashMap<Utf8PathBuf, TestStatus> {
        self.results
            .iter()
            .map(|result| (result.path.clone(), result.status))
            .collect()
    }

    /// Returns the percentage of results that passed, ignoring results with any of the
    /// `excluded` statuses.
    ///
    /// Returns `None` if no results remain after exclusion.
    pub fn pass_rate(&self, excluded: &[TestStatus]) -> Option<f64> {
        self.counts.pass_rate(excluded)
    }

    /// Overlays these (partial) results onto `baseline`.
    ///
    /// * Results in `self` replace baseline results with the same path, in the baseline's order.
    /// * Baseline results whose path isn't in `self` are carried over unchanged.
    /// * Paths only in `self` are appended in the order they appear in `self`.
    ///
    /// Counts are re-derived. Merging the same partial set twice gives the same result as merging
    /// it once.
    pub fn merge_into(&self, baseline: &ResultSet) -> ResultSet {
        // If a path appears more than once in self, the last occurrence wins.
        let latest: HashMap<&Utf8Path, usize> = self
            .results
            .iter()
            .enumerate()
            .map(|(index, result)| (result.path.as_path(), index))
            .collect();

        let mut merged = Vec::with_capacity(baseline.total().max(self.total()));
        let mut replaced = HashSet::new();
        for result in &baseline.results {
            match latest.get(result.path.as_path()) {
                Some(&index) => {
                    merged.push(self.results[index].clone());
                    replaced.insert(result.path.as_path());
                }
                None => merged.push(result.clone()),
            }
        }

        for (index, result) in self.results.iter().enumerate() {
            let path = result.path.as_path();
            if latest[path] == index && !replaced.contains(path) {
                merged.push(result.clone());
            }
        }

        ResultSet::from_results(merged)
    }

    /// Computes memory and timing statistics, with the `top_n` results by peak memory.
    ///
    /// Returns `None` for an empty set.
    pub fn memory_stats(&self, top_n: usize) -> Option<MemoryStats> {
        if self.results.is_empty() {
            return None;
        }

        let mut by_memory: Vec<_> = self.results.iter().collect();
        // Stable sort, so ties keep result order.
        by_memory.sort_by(|a, b| b.memory_kb.cmp(&a.memory_kb));
        let top = by_memory.into_iter().take(top_n).cloned().collect();

        let count = self.results.len();
        let total_memory_kb: u64 = self.results.iter().map(|r| r.memory_kb).sum();
        let total_duration: Duration = self.results.iter().map(|r| r.duration).sum();

        Some(MemoryStats {
            top,
            mean_memory_kb: total_memory_kb / count as u64,
            max_memory_kb: self.results.iter().map(|r| r.memory_kb).max().unwrap_or(0),
            total_memory_kb,
            mean_duration: total_duration / count as u32,
            max_duration: self
                .results
                .iter()
                .map(|r| r.duration)
                .max()
                .unwrap_or_default(),
            total_duration,
        })
    }
}

impl FromIterator<TestResult> for ResultSet {
    fn from_iter<I: IntoIterator<Item = TestResult>>(iter: I) -> Self {
        Self::from_results(iter.into_iter().collect())
    }
}

/// Memory and timing statistics over a [`ResultSet`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemoryStats {
    /// The results with the highest peak memory, highest first.
    pub top: Vec<TestResult>,
    /// Mean peak memory in KiB.
    pub mean_memory_kb: u64,
    /// Highest peak memory in KiB.
    pub max_memory_kb: u64,
    /// Sum of peak memory in KiB.
    pub total_memory_kb: u64,
    /// Mean duration.
    pub mean_duration: Duration,
    /// Longest duration.
    pub max_duration: Duration,
    /// Sum of all durations.
    pub total_duration: Duration,
}

/// Formats a KiB amount with a binary unit, e.g. `1.50 MB`.
pub fn format_memory(kb: u64) -> String {
    if kb >= 1024 * 1024 {
        format!("{:.2} GB", kb as f64 / (1024.0 * 1024.0))
    } else if kb >= 1024 {
        format!("{:.2} MB", kb as f64 / 1024.0)
    } else {
        format!("{kb} KB")
    }
}
