// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{ConformanceExitCode, output::NO_HEADING, output::StderrStyles};
use camino::Utf8PathBuf;
use conformance_runner::errors::*;
use itertools::Itertools;
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are placeholders: errors are meant to be printed with
// display_to_stderr, which colorizes them.

/// An error that `conformance` knows how to report.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("profile not found")]
    ProfileNotFound {
        #[from]
        err: ProfileNotFound,
    },
    #[error("discovery error")]
    DiscoveryError {
        #[from]
        err: DiscoveryError,
    },
    #[error("test paths not found")]
    TestPathsNotFound { paths: Vec<Utf8PathBuf> },
    #[error("test runner build error")]
    TestRunnerBuildError {
        #[from]
        err: TestRunnerBuildError,
    },
    #[error("test runner execute errors")]
    TestRunnerExecuteErrors {
        #[from]
        err: TestRunnerExecuteErrors,
    },
    #[error("run cancelled")]
    RunCancelled { completed: usize, total: usize },
    #[error("results store error")]
    StoreError {
        #[from]
        err: StoreError,
    },
    #[error("unreadable baseline")]
    UnreadableBaseline {
        #[source]
        err: StoreError,
    },
    #[error("results not found")]
    ResultsNotFound { path: Utf8PathBuf },
    #[error("transition filter parse error")]
    TransitionFilterParseError {
        #[from]
        err: TransitionParseError,
    },
    #[error("writing output failed")]
    WriteOutputError {
        #[source]
        err: std::io::Error,
    },
}

impl ExpectedError {
    pub(crate) fn write_output_error(err: std::io::Error) -> Self {
        Self::WriteOutputError { err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ConfigParseError { .. }
            | Self::ProfileNotFound { .. }
            | Self::DiscoveryError { .. }
            | Self::TestPathsNotFound { .. }
            | Self::TestRunnerBuildError { .. } => ConformanceExitCode::SETUP_ERROR,
            Self::TestRunnerExecuteErrors { .. } => ConformanceExitCode::TEST_RUN_FAILED,
            Self::RunCancelled { .. } => ConformanceExitCode::INCOMPLETE_RUN,
            Self::StoreError { .. }
            | Self::UnreadableBaseline { .. }
            | Self::ResultsNotFound { .. } => ConformanceExitCode::RESULTS_STORE_ERROR,
            Self::TransitionFilterParseError { .. } => ConformanceExitCode::INVALID_ARGUMENT,
            Self::WriteOutputError { .. } => ConformanceExitCode::WRITE_OUTPUT_ERROR,
        }
    }

    /// Displays this error to stderr, followed by its chain of causes.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::ProfileNotFound { err } => {
                error!("{err}");
                err.source()
            }
            Self::DiscoveryError { err } => {
                error!(
                    "failed to read test root `{}`",
                    err.root().style(styles.bold)
                );
                err.source()
            }
            Self::TestPathsNotFound { paths } => {
                error!(
                    "none of the requested test paths exist: {}",
                    paths.iter().map(|path| path.style(styles.bold)).join(", ")
                );
                None
            }
            Self::TestRunnerBuildError { err } => {
                error!("failed to build test runner");
                Some(err as &dyn Error)
            }
            Self::TestRunnerExecuteErrors { err } => {
                error!("failed to run tests: {err}");
                for join_error in &err.join_errors {
                    error!(target: NO_HEADING, "  {join_error}");
                }
                None
            }
            Self::RunCancelled { completed, total } => {
                error!(
                    "run cancelled after {} of {total} tests; results were not saved",
                    completed.style(styles.bold)
                );
                None
            }
            Self::StoreError { err } => {
                error!("{err}");
                err.source()
            }
            Self::UnreadableBaseline { err } => {
                error!(
                    "a scoped run can't be merged into an unreadable baseline; \
                     run the full suite to replace it"
                );
                Some(err as &dyn Error)
            }
            Self::ResultsNotFound { path } => {
                error!("result file `{}` does not exist", path.style(styles.bold));
                None
            }
            Self::TransitionFilterParseError { err } => {
                error!("failed to parse transition filter");
                Some(err as &dyn Error)
            }
            Self::WriteOutputError { err } => {
                error!("failed to write report to stdout");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING, "\nCaused by:\n  {err}");
            next_error = err.source();
        }
    }
}
