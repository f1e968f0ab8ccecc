// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the conformance runner.
//!
//! The main structure in this module is [`ConformanceConfig`].

mod imp;
mod workers;

pub use imp::*;
pub use workers::*;
