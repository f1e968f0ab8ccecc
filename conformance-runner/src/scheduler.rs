// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Orders tests so that slow and risky tests run last.
//!
//! Each test gets an estimated run time, taken from the previous run when available and from the
//! file size otherwise. The estimate determines a [`Priority`] bucket, and tests are sorted by
//! `(priority, estimate, path)`.

use crate::{results::TestResult, status::TestStatus};
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use std::{collections::HashMap, fmt, time::Duration};
use tracing::info;

/// The estimate for a test that timed out last time.
pub const TIMEOUT_ESTIMATE: Duration = Duration::from_secs(30);

/// The estimate for a test that crashed last time.
pub const CRASH_ESTIMATE: Duration = Duration::from_secs(20);

/// The estimate when nothing better is known.
pub const BASELINE_ESTIMATE: Duration = Duration::from_millis(500);

/// Per-test durations observed in a previous run.
#[derive(Clone, Debug, Default)]
pub struct TimingHistory {
    durations: HashMap<Utf8PathBuf, Duration>,
}

impl TimingHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a history from previous results.
    ///
    /// Timeouts and crashes are pessimistically treated as very slow, since they tend to be slow
    /// again.
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a TestResult>) -> Self {
        let durations = results
            .into_iter()
            .map(|result| {
                let estimate = match result.status {
                    TestStatus::Timeout => TIMEOUT_ESTIMATE,
                    TestStatus::Crash => CRASH_ESTIMATE,
                    _ if !result.duration.is_zero() => result.duration,
                    _ => BASELINE_ESTIMATE,
                };
                (result.path.clone(), estimate)
            })
            .collect();
        Self { durations }
    }

    /// Returns the recorded estimate for a path.
    pub fn get(&self, path: &Utf8Path) -> Option<Duration> {
        self.durations.get(path).copied()
    }

    /// Returns the number of paths with history.
    pub fn len(&self) -> usize {
        self.durations.len()
    }

    /// Returns true if there is no history.
    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }
}

/// Estimates a test's run time from its size on disk.
///
/// Returns [`BASELINE_ESTIMATE`] if the file can't be read.
pub fn estimate_from_file_size(path: &Utf8Path) -> Duration {
    match path.metadata() {
        Ok(metadata) => estimate_for_size(metadata.len()),
        Err(_) => BASELINE_ESTIMATE,
    }
}

/// Estimates a test's run time from a size in bytes.
pub fn estimate_for_size(size: u64) -> Duration {
    match size / 1024 {
        kb if kb > 100 => Duration::from_secs(10),
        kb if kb > 50 => Duration::from_secs(5),
        kb if kb > 20 => Duration::from_secs(1),
        kb if kb > 5 => Duration::from_millis(200),
        _ => Duration::from_millis(50),
    }
}

/// How soon a test should be dispatched. Lower priorities run first.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Priority {
    /// Expected to take 100ms or less.
    Fast,
    /// Expected to take up to 1s, or no usable estimate.
    Medium,
    /// Expected to take up to 5s.
    Slow,
    /// Expected to take more than 5s, or timed out or crashed last time.
    SlowRisk,
}

impl Priority {
    /// All priorities, in dispatch order.
    pub const ALL: [Priority; 4] = [Self::Fast, Self::Medium, Self::Slow, Self::SlowRisk];

    /// Buckets an estimated run time.
    pub fn for_estimate(estimate: Duration) -> Self {
        if estimate.is_zero() {
            Self::Medium
        } else if estimate > Duration::from_secs(5) {
            Self::SlowRisk
        } else if estimate > Duration::from_secs(1) {
            Self::Slow
        } else if estimate > Duration::from_millis(100) {
            Self::Medium
        } else {
            Self::Fast
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Medium => write!(f, "medium"),
            Self::Slow => write!(f, "slow"),
            Self::SlowRisk => write!(f, "slow-risk"),
        }
    }
}

/// A test waiting to be dispatched.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestJob {
    /// The test file.
    pub path: Utf8PathBuf,
    /// The estimated run time.
    pub estimated_time: Duration,
    /// The priority bucket derived from `estimated_time`.
    pub priority: Priority,
}

/// Orders `paths` for dispatch.
///
/// Paths without history are estimated from their file size. The order is fully determined by
/// the inputs: `(priority, estimated_time, path)` ascending.
pub fn schedule(paths: &[Utf8PathBuf], history: &TimingHistory) -> Vec<TestJob> {
    let mut jobs: Vec<_> = paths
        .iter()
        .map(|path| {
            let estimated_time = history
                .get(path)
                .unwrap_or_else(|| estimate_from_file_size(path));
            TestJob {
                path: path.clone(),
                estimated_time,
                priority: Priority::for_estimate(estimated_time),
            }
        })
        .collect();

    jobs.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(a.estimated_time.cmp(&b.estimated_time))
            .then_with(|| a.path.cmp(&b.path))
    });
    jobs
}

/// Summary statistics over a schedule.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ScheduleStatistics {
    /// The number of jobs.
    pub count: usize,
    /// The smallest estimate.
    pub min: Duration,
    /// The largest estimate.
    pub max: Duration,
    /// The mean estimate.
    pub mean: Duration,
    /// The sum of all estimates.
    pub total: Duration,
    by_priority: [usize; 4],
}

impl ScheduleStatistics {
    /// Computes statistics for a schedule.
    pub fn compute(jobs: &[TestJob]) -> Self {
        let mut stats = Self {
            count: jobs.len(),
            min: jobs
                .iter()
                .map(|job| job.estimated_time)
                .min()
                .unwrap_or_default(),
            max: jobs
                .iter()
                .map(|job| job.estimated_time)
                .max()
                .unwrap_or_default(),
            ..Default::default()
        };

        for job in jobs {
            stats.total += job.estimated_time;
            stats.by_priority[job.priority.index()] += 1;
        }
        if !jobs.is_empty() {
            stats.mean = stats.total / jobs.len() as u32;
        }
        stats
    }

    /// Returns the number of jobs in a priority bucket.
    pub fn count_for(&self, priority: Priority) -> usize {
        self.by_priority[priority.index()]
    }

    /// Logs the statistics at info level.
    pub fn log(&self) {
        info!(
            "scheduled {} tests: min {:?}, max {:?}, mean {:?}",
            self.count, self.min, self.max, self.mean,
        );
        info!(
            "priority buckets: {}",
            Priority::ALL
                .iter()
                .map(|priority| format!("{priority} {}", self.count_for(*priority)))
                .join(", "),
        );
    }
}
