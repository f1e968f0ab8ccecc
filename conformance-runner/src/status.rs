// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The closed set of outcomes a test can have.
//!
//! Each outcome has a full form ([`TestStatus`], written as e.g. `PARSE_ERROR`) and a compact
//! archival code ([`CompactStatus`], e.g. `O`).

use crate::errors::{CompactStatusParseError, StatusParseError};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    ops::{Index, IndexMut},
    str::FromStr,
};

/// The outcome of a single test.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    /// The engine reported success.
    Pass,

    /// The engine reported a test assertion failure.
    Fail,

    /// The test was not run, either by skip policy or by the engine's own choice.
    Skip,

    /// The engine did not finish within the per-test deadline.
    Timeout,

    /// The engine exited abnormally, or exited cleanly without a recognized verdict.
    Crash,

    /// The engine failed to parse a test that was expected to parse.
    ParseError,

    /// The engine parsed a test that was expected to fail parsing.
    ParseSuccessError,

    /// The engine hit an unimplemented feature.
    NotImplemented,

    /// The harness itself failed to run the test.
    RunnerError,
}

impl TestStatus {
    /// The number of statuses.
    pub const COUNT: usize = 9;

    /// All statuses, in declaration order.
    pub const ALL: [TestStatus; Self::COUNT] = [
        Self::Pass,
        Self::Fail,
        Self::Skip,
        Self::Timeout,
        Self::Crash,
        Self::ParseError,
        Self::ParseSuccessError,
        Self::NotImplemented,
        Self::RunnerError,
    ];

    /// Returns the full form of this status, as used in the persisted result file.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
            Self::Timeout => "TIMEOUT",
            Self::Crash => "CRASH",
            Self::ParseError => "PARSE_ERROR",
            Self::ParseSuccessError => "PARSE_SUCCESS_ERROR",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::RunnerError => "RUNNER_ERROR",
        }
    }

    /// Returns the compact archival code for this status.
    pub const fn compact(self) -> CompactStatus {
        match self {
            Self::Pass => CompactStatus::P,
            Self::Fail => CompactStatus::F,
            Self::Skip => CompactStatus::S,
            Self::Timeout => CompactStatus::T,
            Self::Crash => CompactStatus::C,
            Self::ParseError => CompactStatus::O,
            Self::ParseSuccessError => CompactStatus::E,
            Self::NotImplemented => CompactStatus::PF,
            Self::RunnerError => CompactStatus::N,
        }
    }

    /// Returns true if this status counts as a pass.
    pub fn is_pass(self) -> bool {
        self == Self::Pass
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StatusParseError::new(s))
    }
}

/// The compact archival code for a [`TestStatus`].
///
/// The mapping is 1:1. Two codes carry historical meanings that don't match the status name:
/// `PARSE_ERROR` is archived as `O` ("ok") and `NOT_IMPLEMENTED` as `PF` ("precondition
/// failed").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum CompactStatus {
    /// Pass.
    P,
    /// Fail.
    F,
    /// Skip.
    S,
    /// Timeout.
    T,
    /// Crash.
    C,
    /// Parse error, archived as "ok".
    O,
    /// Parse success error, archived as "error".
    E,
    /// Not implemented, archived as "precondition failed".
    PF,
    /// Runner error, archived as "not run".
    N,
}

impl CompactStatus {
    /// Returns the code as a string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::P => "P",
            Self::F => "F",
            Self::S => "S",
            Self::T => "T",
            Self::C => "C",
            Self::O => "O",
            Self::E => "E",
            Self::PF => "PF",
            Self::N => "N",
        }
    }

    /// Returns the full status this code stands for.
    pub const fn status(self) -> TestStatus {
        match self {
            Self::P => TestStatus::Pass,
            Self::F => TestStatus::Fail,
            Self::S => TestStatus::Skip,
            Self::T => TestStatus::Timeout,
            Self::C => TestStatus::Crash,
            Self::O => TestStatus::ParseError,
            Self::E => TestStatus::ParseSuccessError,
            Self::PF => TestStatus::NotImplemented,
            Self::N => TestStatus::RunnerError,
        }
    }
}

impl fmt::Display for CompactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompactStatus {
    type Err = CompactStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TestStatus::ALL
            .into_iter()
            .map(TestStatus::compact)
            .find(|code| code.as_str() == s)
            .ok_or_else(|| CompactStatusParseError::new(s))
    }
}

/// A fixed-size map from every [`TestStatus`] to a value.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StatusMap<T> {
    values: [T; TestStatus::COUNT],
}

impl<T> StatusMap<T> {
    /// Creates a new map by calling `f` for each status.
    pub fn from_fn(mut f: impl FnMut(TestStatus) -> T) -> Self {
        Self {
            values: TestStatus::ALL.map(&mut f),
        }
    }

    /// Iterates over `(status, value)` pairs in status order.
    pub fn iter(&self) -> impl Iterator<Item = (TestStatus, &T)> + '_ {
        TestStatus::ALL.into_iter().zip(self.values.iter())
    }

    /// Maps each value to a new value.
    pub fn map<U>(&self, mut f: impl FnMut(TestStatus, &T) -> U) -> StatusMap<U> {
        StatusMap::from_fn(|status| f(status, &self[status]))
    }
}

impl<T> Index<TestStatus> for StatusMap<T> {
    type Output = T;

    fn index(&self, status: TestStatus) -> &T {
        &self.values[status.index()]
    }
}

impl<T> IndexMut<TestStatus> for StatusMap<T> {
    fn index_mut(&mut self, status: TestStatus) -> &mut T {
        &mut self.values[status.index()]
    }
}

/// Per-status counts.
pub type StatusCounts = StatusMap<usize>;

impl StatusCounts {
    /// Returns the sum of all counts.
    pub fn total(&self) -> usize {
        self.values.iter().sum()
    }

    /// Returns the percentage of passing tests, ignoring tests with any of the `excluded`
    /// statuses.
    ///
    /// Returns `None` if no tests remain after exclusion.
    pub fn pass_rate(&self, excluded: &[TestStatus]) -> Option<f64> {
        let considered: usize = self
            .iter()
            .filter(|(status, _)| !excluded.contains(status))
            .map(|(_, count)| *count)
            .sum();
        (considered > 0).then(|| self[TestStatus::Pass] as f64 / considered as f64 * 100.0)
    }
}
