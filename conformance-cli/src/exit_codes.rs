// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `conformance` failures.
///
/// A run that finishes exits with [`OK`](Self::OK) no matter how many tests failed: per-test
/// outcomes are reported, not treated as errors.
pub enum ConformanceExitCode {}

impl ConformanceExitCode {
    /// No errors occurred and the command completed.
    pub const OK: i32 = 0;

    /// A worker task panicked during the run.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// The run was interrupted by a signal. Results were not persisted.
    pub const INCOMPLETE_RUN: i32 = 106;

    /// Reading or writing a result file failed.
    pub const RESULTS_STORE_ERROR: i32 = 103;

    /// Writing a report to stdout failed.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;

    /// An argument, such as a diff filter, could not be parsed.
    pub const INVALID_ARGUMENT: i32 = 94;

    /// The config, test root or runner could not be set up.
    pub const SETUP_ERROR: i32 = 96;
}
