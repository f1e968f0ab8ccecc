// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core logic for running a conformance corpus against an external engine binary.
//!
//! The pieces fit together as follows:
//!
//! 1. [`discovery`] walks the test root and splits files into tests to run and tests to skip.
//! 2. [`scheduler`] orders the tests using the timing history of the previous run.
//! 3. [`runner::TestRunner`] runs each test in its own engine process across a pool of workers,
//!    classifying outcomes with [`classify`].
//! 4. [`results`], [`progress`] and [`store`] aggregate, compare and persist the outcomes.

#![warn(missing_docs)]

pub mod classify;
pub mod config;
pub mod discovery;
mod engine_command;
pub mod engine_timings;
pub mod errors;
mod memory;
pub mod progress;
pub mod results;
pub mod runner;
pub mod scheduler;
pub mod signal;
pub mod status;
pub mod store;
mod time;
