// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live progress and baseline deltas while a run is in flight.

use crate::{
    results::TestResult,
    status::{StatusCounts, StatusMap, TestStatus},
};
use camino::Utf8PathBuf;
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicI32, AtomicU32, AtomicUsize, Ordering},
    },
};
use tracing::info;

/// The number of most recent status changes kept.
pub const RECENT_CHANGES: usize = 20;

/// A test whose status differs from the baseline.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatusChange {
    /// The test file.
    pub path: Utf8PathBuf,
    /// The status in the baseline.
    pub from: TestStatus,
    /// The new status.
    pub to: TestStatus,
}

/// Tracks per-status counts and changes against a baseline as results come in.
///
/// Every method takes `&self`, so a tracker can be shared across threads.
#[derive(Debug)]
pub struct ProgressTracker {
    total: usize,
    baseline: Option<HashMap<Utf8PathBuf, TestStatus>>,
    completed: AtomicUsize,
    counts: StatusMap<AtomicU32>,
    gained: StatusMap<AtomicI32>,
    lost: StatusMap<AtomicI32>,
    recent_changes: Mutex<VecDeque<StatusChange>>,
    report_every: usize,
}

impl ProgressTracker {
    /// Creates a tracker for a run of `total` tests.
    ///
    /// If `baseline` is provided, each result whose path is in it with a different status
    /// counts as one gained for the new status and one lost for the old status.
    pub fn new(total: usize, baseline: Option<HashMap<Utf8PathBuf, TestStatus>>) -> Self {
        Self {
            total,
            baseline,
            completed: AtomicUsize::new(0),
            counts: StatusMap::default(),
            gained: StatusMap::default(),
            lost: StatusMap::default(),
            recent_changes: Mutex::new(VecDeque::with_capacity(RECENT_CHANGES)),
            report_every: (total / 50).max(100),
        }
    }

    /// Records a result.
    pub fn add(&self, result: &TestResult) {
        self.counts[result.status].fetch_add(1, Ordering::Relaxed);

        if let Some(&old) = self
            .baseline
            .as_ref()
            .and_then(|baseline| baseline.get(&result.path))
        {
            if old != result.status {
                self.lost[old].fetch_add(1, Ordering::Relaxed);
                self.gained[result.status].fetch_add(1, Ordering::Relaxed);
                self.push_change(StatusChange {
                    path: result.path.clone(),
                    from: old,
                    to: result.status,
                });
            }
        }

        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        if completed % self.report_every == 0 || completed == self.total {
            self.log_progress(completed);
        }
    }

    /// Returns the number of results recorded so far.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    /// Returns the most recent status changes, oldest first.
    pub fn recent_changes(&self) -> Vec<StatusChange> {
        self.lock_changes().iter().cloned().collect()
    }

    /// Returns a snapshot of the current state.
    pub fn summary(&self) -> Summary {
        Summary {
            total: self.total,
            completed: self.completed(),
            counts: self
                .counts
                .map(|_, count| count.load(Ordering::Relaxed) as usize),
            gained: self.gained.map(|_, n| n.load(Ordering::Relaxed)),
            lost: self.lost.map(|_, n| n.load(Ordering::Relaxed)),
            has_baseline: self.baseline.is_some(),
        }
    }

    /// Consumes the tracker, returning the final summary.
    pub fn finish(self) -> Summary {
        self.summary()
    }

    fn push_change(&self, change: StatusChange) {
        let mut changes = self.lock_changes();
        if changes.len() == RECENT_CHANGES {
            changes.pop_front();
        }
        changes.push_back(change);
    }

    fn lock_changes(&self) -> std::sync::MutexGuard<'_, VecDeque<StatusChange>> {
        // The queue is always left consistent, so a poisoned lock is still usable.
        self.recent_changes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn log_progress(&self, completed: usize) {
        let percent = if self.total == 0 {
            100.0
        } else {
            completed as f64 / self.total as f64 * 100.0
        };
        let counts = self.summary().counts;
        info!(
            "progress: {completed}/{} ({percent:.1}%), {} passed, {} failed, {} crashed, {} timed out",
            self.total,
            counts[TestStatus::Pass],
            counts[TestStatus::Fail],
            counts[TestStatus::Crash],
            counts[TestStatus::Timeout],
        );
    }
}

/// A snapshot of a [`ProgressTracker`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Summary {
    /// The number of tests expected.
    pub total: usize,
    /// The number of results recorded.
    pub completed: usize,
    /// Per-status counts.
    pub counts: StatusCounts,
    /// Per status, the number of tests that newly have it compared to the baseline.
    pub gained: StatusMap<i32>,
    /// Per status, the number of tests that no longer have it compared to the baseline.
    pub lost: StatusMap<i32>,
    /// Whether a baseline was available.
    pub has_baseline: bool,
}

impl Summary {
    /// Returns the net change for a status, `gained - lost`.
    pub fn net_change(&self, status: TestStatus) -> i32 {
        self.gained[status] - self.lost[status]
    }

    /// Returns true if any test changed status relative to the baseline.
    pub fn has_changes(&self) -> bool {
        self.gained.iter().any(|(_, n)| *n != 0)
    }
}
