// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the conformance runner.
//!
//! Per-test failures are never errors: they are recorded as a [`TestStatus`]. The types here
//! cover the infrastructure around a run.

use crate::status::TestStatus;
use camino::Utf8PathBuf;
use config::ConfigError;
use std::io;
use thiserror::Error;

/// Error returned while parsing a [`TestStatus`] from a string.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error(
    "unrecognized test status: {input}\n(known values: {})",
    TestStatus::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
)]
pub struct StatusParseError {
    input: String,
}

impl StatusParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }

    /// Returns the input that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }
}

/// Error returned while parsing a compact status code.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unrecognized compact status code: {input}")]
pub struct CompactStatusParseError {
    input: String,
}

impl CompactStatusParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// Error returned while parsing a `FROM->TO` status transition.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionParseError {
    /// The input did not have exactly one `->` separator.
    #[error("invalid transition `{input}`: expected the form FROM->TO")]
    InvalidFormat {
        /// The input that failed to parse.
        input: String,
    },

    /// One side of the transition was not a known status.
    #[error("invalid transition `{input}`")]
    InvalidStatus {
        /// The input that failed to parse.
        input: String,

        /// The underlying error.
        #[source]
        error: StatusParseError,
    },
}

/// An error that occurs while building a [`TestRunner`](crate::runner::TestRunner).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestRunnerBuildError {
    /// The worker count was zero.
    #[error("worker count must be at least 1")]
    ZeroWorkers,

    /// The per-test timeout was zero.
    #[error("per-test timeout must be greater than zero")]
    ZeroTimeout,

    /// The memory sampling interval was zero.
    #[error("memory sample interval must be greater than zero")]
    ZeroSampleInterval,

    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] io::Error),

    /// An error occurred while setting up signals.
    #[error("error setting up signals")]
    SignalHandlerSetupError(#[from] SignalHandlerSetupError),
}

/// Errors that occurred while managing test runner Tokio tasks.
#[derive(Debug, Error)]
#[error("{} worker task(s) panicked or were aborted", .join_errors.len())]
pub struct TestRunnerExecuteErrors {
    /// Join errors from the worker and producer tasks.
    pub join_errors: Vec<tokio::task::JoinError>,
}

/// An error occurred while setting up the signal handler.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct SignalHandlerSetupError(#[from] io::Error);

/// The test root could not be read.
#[derive(Debug, Error)]
#[error("failed to read test root `{root}`")]
pub struct DiscoveryError {
    root: Utf8PathBuf,
    #[source]
    error: io::Error,
}

impl DiscoveryError {
    pub(crate) fn new(root: impl Into<Utf8PathBuf>, error: io::Error) -> Self {
        Self {
            root: root.into(),
            error,
        }
    }

    /// Returns the root that could not be read.
    pub fn root(&self) -> &Utf8PathBuf {
        &self.root
    }
}

/// An error that occurred while reading or writing a result file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The result file could not be read.
    #[error("error reading results from `{path}`")]
    Read {
        /// The path that was read.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The result file was not valid JSON, or did not have the expected shape.
    #[error("error deserializing results from `{path}`")]
    Deserialize {
        /// The path that was read.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// The results could not be serialized.
    #[error("error serializing results for `{path}`")]
    Serialize {
        /// The path that was going to be written.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// The parent directory of the result file could not be created.
    #[error("error creating directory `{dir}`")]
    CreateDir {
        /// The directory.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The result file could not be written.
    #[error("error writing results to `{path}`")]
    Write {
        /// The path that was written.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: atomicwrites::Error<io::Error>,
    },

    /// The lock file could not be opened or locked.
    #[error("error acquiring lock on `{path}`")]
    FileLock {
        /// The lock file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of [`ConfigParseError`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// A profile was requested but is not defined in the config.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }
}

/// Error returned while parsing a worker count.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid value for workers: {message}")]
pub struct WorkersParseError {
    message: String,
}

impl WorkersParseError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
