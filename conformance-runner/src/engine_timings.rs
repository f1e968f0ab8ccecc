// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregating the phase timings an engine can print.
//!
//! An engine built with timing output prints lines like `PARSE: 1234` with nanosecond values.
//! These are collected across all tests into an [`EngineTimings`] aggregate.

use std::{fmt, sync::Mutex, time::Duration};

/// A phase an engine reports timing for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EnginePhase {
    /// The whole run of the engine.
    Total,
    /// Creating the realm.
    Realm,
    /// Parsing the test and its harness files.
    Parse,
    /// Setting up the harness.
    Setup,
}

impl EnginePhase {
    /// All phases, in report order.
    pub const ALL: [EnginePhase; 4] = [Self::Total, Self::Realm, Self::Parse, Self::Setup];

    fn prefix(self) -> &'static str {
        match self {
            Self::Total => "TOTAL:",
            Self::Realm => "REALM:",
            Self::Parse => "PARSE:",
            Self::Setup => "SETUP:",
        }
    }
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Total => "total",
            Self::Realm => "realm",
            Self::Parse => "parse",
            Self::Setup => "setup",
        };
        f.write_str(name)
    }
}

/// The phase timings found in one test's output.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PhaseTimings {
    values: [Option<Duration>; 4],
}

impl PhaseTimings {
    /// Extracts timing lines from engine output. Malformed lines are ignored.
    pub fn parse(output: &str) -> Self {
        let mut timings = Self::default();
        for line in output.lines() {
            let line = line.trim();
            for phase in EnginePhase::ALL {
                if let Some(value) = line.strip_prefix(phase.prefix()) {
                    if let Ok(nanos) = value.trim().parse::<u64>() {
                        timings.values[phase_index(phase)] = Some(Duration::from_nanos(nanos));
                    }
                }
            }
        }
        timings
    }

    /// Returns the timing for a phase, if it was reported.
    pub fn get(&self, phase: EnginePhase) -> Option<Duration> {
        self.values[phase_index(phase)]
    }

    /// Returns true if no phase was reported.
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct PhaseTotals {
    sums: [Duration; 4],
    tests: usize,
}

/// Engine phase timings accumulated over a run. Shared between workers.
#[derive(Debug, Default)]
pub struct EngineTimings {
    totals: Mutex<PhaseTotals>,
}

impl EngineTimings {
    /// Creates an empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one test's output and adds its timings. Output without timing lines is ignored.
    pub fn record(&self, output: &str) {
        let timings = PhaseTimings::parse(output);
        if timings.is_empty() {
            return;
        }

        let mut totals = self.totals.lock().unwrap_or_else(|e| e.into_inner());
        totals.tests += 1;
        for (sum, value) in totals.sums.iter_mut().zip(timings.values) {
            *sum += value.unwrap_or_default();
        }
    }

    /// Returns the accumulated report.
    pub fn report(&self) -> EngineTimingsReport {
        let totals = *self.totals.lock().unwrap_or_else(|e| e.into_inner());
        EngineTimingsReport { totals }
    }
}

/// A snapshot of [`EngineTimings`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EngineTimingsReport {
    totals: PhaseTotals,
}

impl EngineTimingsReport {
    /// The number of tests that reported timings.
    pub fn tests(&self) -> usize {
        self.totals.tests
    }

    /// The summed time for a phase.
    pub fn total(&self, phase: EnginePhase) -> Duration {
        self.totals.sums[phase_index(phase)]
    }

    /// The mean time per test for a phase.
    pub fn mean(&self, phase: EnginePhase) -> Duration {
        match u32::try_from(self.totals.tests) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(tests) => self.total(phase) / tests,
        }
    }

    /// The share of total engine time spent in a phase, as a percentage.
    pub fn percentage(&self, phase: EnginePhase) -> f64 {
        let total = self.total(EnginePhase::Total);
        if total.is_zero() {
            return 0.0;
        }
        self.total(phase).as_secs_f64() / total.as_secs_f64() * 100.0
    }
}

fn phase_index(phase: EnginePhase) -> usize {
    match phase {
        EnginePhase::Total => 0,
        EnginePhase::Realm => 1,
        EnginePhase::Parse => 2,
        EnginePhase::Setup => 3,
    }
}
