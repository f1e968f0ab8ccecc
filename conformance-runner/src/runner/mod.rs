// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running tests.
//!
//! [`Executor`] runs a single test file under the engine. [`TestRunner`] drives many executors
//! from a bounded worker pool.

mod executor;
mod imp;

pub use executor::*;
pub use imp::*;
