// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Maps what was observed about an engine process onto a [`TestStatus`].
//!
//! The engine reports its verdict as a prefix of its combined output. The prefix is only trusted
//! in combination with the exit status: for example, `PASS` on a non-zero exit is a crash.

use crate::status::TestStatus;
use tracing::warn;

/// How an engine process ended, as far as the executor could tell.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChildExit {
    /// The process could not be started, or waiting on it failed.
    NotObserved,

    /// The process exited with status 0.
    Success,

    /// The process exited with a non-zero status or was killed by a signal.
    Failure,
}

/// Everything the classifier needs to know about a finished engine process besides its output.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChildObservation {
    /// True if the per-test deadline fired before the process exited.
    pub deadline_exceeded: bool,

    /// How the process ended.
    pub exit: ChildExit,
}

impl ChildObservation {
    /// The observation for a process that exited on its own.
    pub fn exited(success: bool) -> Self {
        Self {
            deadline_exceeded: false,
            exit: if success {
                ChildExit::Success
            } else {
                ChildExit::Failure
            },
        }
    }

    /// The observation for a process that could not be started.
    pub fn start_failed() -> Self {
        Self {
            deadline_exceeded: false,
            exit: ChildExit::NotObserved,
        }
    }
}

// Verdict prefixes on a clean exit. Checked in order.
const CLEAN_EXIT_VERDICTS: &[(&str, TestStatus)] = &[
    ("PASS", TestStatus::Pass),
    ("FAIL", TestStatus::Fail),
    ("Test262:AsyncTestComplete", TestStatus::Pass),
    ("Test262:AsyncTestFailure:", TestStatus::Fail),
    ("SKIP", TestStatus::Skip),
];

// Verdict prefixes on a non-zero exit. Checked in order.
const FAILED_EXIT_VERDICTS: &[(&str, TestStatus)] = &[
    ("PARSE_ERROR", TestStatus::ParseError),
    ("PARSE_SUCCESS_ERROR", TestStatus::ParseSuccessError),
];

// All three must be present for a panic to count as an unimplemented feature.
const NOT_IMPLEMENTED_MARKERS: [&str; 3] = ["not yet implemented", "thread '", "' panicked at"];

/// Classifies a finished engine process.
///
/// Rules are applied in order and the first match wins:
///
/// 1. A fired deadline is always [`TestStatus::Timeout`], whatever the output says.
/// 2. A process that was never observed is [`TestStatus::RunnerError`].
/// 3. On a non-zero exit, the `PARSE_ERROR` and `PARSE_SUCCESS_ERROR` prefixes map to their
///    statuses, a Rust "not yet implemented" panic maps to [`TestStatus::NotImplemented`], and
///    anything else is a [`TestStatus::Crash`].
/// 4. On a clean exit, the `PASS`/`FAIL`/`SKIP` prefixes (and the async harness markers) map to
///    their statuses. Anything else is a [`TestStatus::Crash`].
pub fn classify(observation: ChildObservation, output: &str) -> TestStatus {
    if observation.deadline_exceeded {
        return TestStatus::Timeout;
    }

    match observation.exit {
        ChildExit::NotObserved => TestStatus::RunnerError,
        ChildExit::Failure => {
            if let Some(status) = match_prefix(FAILED_EXIT_VERDICTS, output) {
                status
            } else if NOT_IMPLEMENTED_MARKERS
                .iter()
                .all(|marker| output.contains(marker))
            {
                TestStatus::NotImplemented
            } else {
                TestStatus::Crash
            }
        }
        ChildExit::Success => match match_prefix(CLEAN_EXIT_VERDICTS, output) {
            Some(status) => status,
            None => {
                warn!(
                    "engine exited cleanly without a verdict (output starts with {:?})",
                    output.chars().take(40).collect::<String>(),
                );
                TestStatus::Crash
            }
        },
    }
}

fn match_prefix(verdicts: &[(&str, TestStatus)], output: &str) -> Option<TestStatus> {
    verdicts
        .iter()
        .find(|(prefix, _)| output.starts_with(prefix))
        .map(|&(_, status)| status)
}
