// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs an engine against a conformance suite and tracks results across runs.
//!
//! The binary is `conformance`. The scheduling, execution and result handling live in
//! [`conformance_runner`]; this crate parses arguments, loads config and prints reports.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod exit_codes;
mod output;
mod reporter;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
pub use exit_codes::ConformanceExitCode;
