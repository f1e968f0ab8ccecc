// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable reports written to stdout.

use crate::output::ReportStyles;
use conformance_runner::{
    engine_timings::{EnginePhase, EngineTimingsReport},
    progress::Summary,
    results::{Diff, MemoryStats, ResultSet, StatusTransition, format_memory},
    status::{StatusCounts, StatusMap, TestStatus},
};
use owo_colors::{OwoColorize, Style};
use std::{io, io::Write, time::Duration};

/// The number of tests listed by peak memory in `--stats` output.
pub(crate) const TOP_MEMORY: usize = 10;

pub(crate) struct Reporter<'a> {
    styles: &'a ReportStyles,
    verbose: bool,
}

impl<'a> Reporter<'a> {
    pub(crate) fn new(styles: &'a ReportStyles, verbose: bool) -> Self {
        Self { styles, verbose }
    }

    /// Writes the counts for a finished run, with changes against the baseline if there was one.
    pub(crate) fn write_summary(
        &self,
        summary: &Summary,
        elapsed: Duration,
        out: &mut impl Write,
    ) -> io::Result<()> {
        writeln!(
            out,
            "{} {} tests in {}",
            "Ran".style(self.styles.heading),
            summary.completed,
            humantime::format_duration(round_to_millis(elapsed)),
        )?;
        let deltas = summary.has_baseline.then(|| {
            StatusMap::from_fn(|status| summary.net_change(status))
        });
        self.write_counts(&summary.counts, deltas.as_ref(), out)?;
        self.write_pass_rate(&summary.counts, out)
    }

    /// Writes the counts and pass rate of a result set.
    pub(crate) fn write_totals(&self, results: &ResultSet, out: &mut impl Write) -> io::Result<()> {
        writeln!(
            out,
            "{} {} results",
            "Total:".style(self.styles.heading),
            results.total()
        )?;
        self.write_counts(results.counts(), None, out)?;
        self.write_pass_rate(results.counts(), out)
    }

    /// Writes the tests that changed status, grouped by transition.
    ///
    /// With `filter`, only those transitions are written, in that order. In verbose mode, the
    /// first line of each test's message in `new` is shown under its path.
    pub(crate) fn write_diff(
        &self,
        diff: &Diff,
        filter: Option<&[StatusTransition]>,
        new: Option<&ResultSet>,
        out: &mut impl Write,
    ) -> io::Result<()> {
        let transitions: Vec<_> = match filter {
            Some(filter) => diff.filter(filter).collect(),
            None => diff.iter().collect(),
        };
        if transitions.is_empty() {
            return writeln!(out, "no status changes");
        }

        for (transition, paths) in transitions {
            let style = if transition.to.is_pass() {
                self.styles.gained
            } else if transition.from.is_pass() {
                self.styles.lost
            } else {
                self.styles.heading
            };
            writeln!(out, "{} ({})", transition.style(style), paths.len())?;
            for path in paths {
                writeln!(out, "  {}", path.style(self.styles.path))?;
                if self.verbose {
                    if let Some(line) = new
                        .and_then(|results| results.get(path))
                        .and_then(|result| result.message.lines().next())
                    {
                        writeln!(out, "    {line}")?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Writes peak memory and duration statistics.
    pub(crate) fn write_memory_stats(
        &self,
        stats: &MemoryStats,
        out: &mut impl Write,
    ) -> io::Result<()> {
        writeln!(out, "{}", "Memory:".style(self.styles.heading))?;
        writeln!(
            out,
            "  mean {}, max {}, total {}",
            format_memory(stats.mean_memory_kb),
            format_memory(stats.max_memory_kb),
            format_memory(stats.total_memory_kb),
        )?;
        writeln!(out, "{}", "Duration:".style(self.styles.heading))?;
        writeln!(
            out,
            "  mean {}, max {}, total {}",
            humantime::format_duration(round_to_millis(stats.mean_duration)),
            humantime::format_duration(round_to_millis(stats.max_duration)),
            humantime::format_duration(round_to_millis(stats.total_duration)),
        )?;

        writeln!(
            out,
            "{}",
            format!("Top {} by peak memory:", stats.top.len()).style(self.styles.heading)
        )?;
        for result in &stats.top {
            writeln!(
                out,
                "  {:>10}  {:<20}  {}",
                format_memory(result.memory_kb),
                result.status.as_str(),
                result.path.style(self.styles.path),
            )?;
        }
        Ok(())
    }

    /// Writes the engine's self-reported phase timings.
    pub(crate) fn write_engine_timings(
        &self,
        report: &EngineTimingsReport,
        out: &mut impl Write,
    ) -> io::Result<()> {
        writeln!(
            out,
            "{} ({} tests reported)",
            "Engine timings:".style(self.styles.heading),
            report.tests()
        )?;
        if report.tests() == 0 {
            return Ok(());
        }
        for phase in EnginePhase::ALL {
            writeln!(
                out,
                "  {:<6} total {}, mean {}, {:.1}%",
                phase.to_string(),
                humantime::format_duration(round_to_millis(report.total(phase))),
                humantime::format_duration(report.mean(phase)),
                report.percentage(phase),
            )?;
        }
        Ok(())
    }

    fn write_counts(
        &self,
        counts: &StatusCounts,
        deltas: Option<&StatusMap<i32>>,
        out: &mut impl Write,
    ) -> io::Result<()> {
        for (status, count) in counts.iter() {
            let delta = deltas.map_or(0, |deltas| deltas[status]);
            if *count == 0 && delta == 0 {
                continue;
            }
            write!(
                out,
                "  {:<20} {count:>8}",
                status.as_str().style(self.status_style(status))
            )?;
            match delta {
                0 => writeln!(out)?,
                delta if delta > 0 => {
                    writeln!(out, "  {}", format!("+{delta}").style(self.styles.gained))?
                }
                delta => writeln!(out, "  {}", delta.style(self.styles.lost))?,
            }
        }
        Ok(())
    }

    fn write_pass_rate(&self, counts: &StatusCounts, out: &mut impl Write) -> io::Result<()> {
        let Some(rate) = counts.pass_rate(&[]) else {
            return Ok(());
        };
        write!(out, "{} {rate:.2}%", "Pass rate:".style(self.styles.heading))?;
        match counts.pass_rate(&[TestStatus::Skip]) {
            Some(executed) if counts[TestStatus::Skip] > 0 => {
                writeln!(out, " ({executed:.2}% excluding skipped)")
            }
            _ => writeln!(out),
        }
    }

    fn status_style(&self, status: TestStatus) -> Style {
        match status {
            TestStatus::Pass => self.styles.pass,
            TestStatus::Skip => self.styles.skip,
            _ => self.styles.fail,
        }
    }
}

fn round_to_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis().try_into().unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use conformance_runner::results::{TestResult, compute_diff};
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn result(path: &str, status: TestStatus, message: &str, memory_kb: u64) -> TestResult {
        TestResult {
            status,
            message: message.to_owned(),
            path: path.into(),
            memory_kb,
            duration: Duration::from_millis(250),
        }
    }

    fn render(f: impl FnOnce(&Reporter<'_>, &mut Vec<u8>) -> io::Result<()>) -> String {
        render_verbose(false, f)
    }

    fn render_verbose(
        verbose: bool,
        f: impl FnOnce(&Reporter<'_>, &mut Vec<u8>) -> io::Result<()>,
    ) -> String {
        let styles = ReportStyles::default();
        let reporter = Reporter::new(&styles, verbose);
        let mut out = Vec::new();
        f(&reporter, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn summary_with_baseline() {
        let mut counts = StatusCounts::default();
        counts[TestStatus::Pass] = 3;
        counts[TestStatus::Fail] = 1;
        let mut gained = StatusMap::default();
        let mut lost = StatusMap::default();
        gained[TestStatus::Pass] = 2;
        lost[TestStatus::Crash] = 2;

        let summary = Summary {
            total: 4,
            completed: 4,
            counts,
            gained,
            lost,
            has_baseline: true,
        };
        let text = render(|reporter, out| {
            reporter.write_summary(&summary, Duration::from_micros(1_500_300), out)
        });
        assert_eq!(
            text,
            indoc! {"
                Ran 4 tests in 1s 500ms
                  PASS                        3  +2
                  FAIL                        1
                  CRASH                       0  -2
                Pass rate: 75.00%
            "}
        );
    }

    #[test]
    fn totals_exclude_skipped_from_second_rate() {
        let results = ResultSet::from_results(vec![
            result("a.js", TestStatus::Pass, "", 0),
            result("b.js", TestStatus::Skip, "", 0),
            result("c.js", TestStatus::Fail, "", 0),
            result("d.js", TestStatus::Pass, "", 0),
        ]);
        let text = render(|reporter, out| reporter.write_totals(&results, out));
        assert_eq!(
            text,
            indoc! {"
                Total: 4 results
                  PASS                        2
                  FAIL                        1
                  SKIP                        1
                Pass rate: 50.00% (66.67% excluding skipped)
            "}
        );
    }

    #[test]
    fn diff_grouped_by_transition() {
        let old = ResultSet::from_results(vec![
            result("a.js", TestStatus::Pass, "", 0),
            result("b.js", TestStatus::Crash, "", 0),
            result("c.js", TestStatus::Pass, "", 0),
        ]);
        let new = ResultSet::from_results(vec![
            result("a.js", TestStatus::Fail, "FAIL: expected 1\nat line 3", 0),
            result("b.js", TestStatus::Pass, "PASS", 0),
            result("c.js", TestStatus::Pass, "PASS", 0),
        ]);
        let diff = compute_diff(&old, &new);

        let text = render(|reporter, out| reporter.write_diff(&diff, None, None, out));
        assert_eq!(
            text,
            indoc! {"
                PASS->FAIL (1)
                  a.js
                CRASH->PASS (1)
                  b.js
            "}
        );

        let filter = [StatusTransition::new(TestStatus::Pass, TestStatus::Fail)];
        let text = render_verbose(true, |reporter, out| {
            reporter.write_diff(&diff, Some(&filter), Some(&new), out)
        });
        assert_eq!(
            text,
            indoc! {"
                PASS->FAIL (1)
                  a.js
                    FAIL: expected 1
            "}
        );

        let text = render(|reporter, out| reporter.write_diff(&Diff::default(), None, None, out));
        assert_eq!(text, "no status changes\n");
    }

    #[test]
    fn memory_stats() {
        let results = ResultSet::from_results(vec![
            result("small.js", TestStatus::Pass, "", 512),
            result("big.js", TestStatus::Timeout, "", 4096),
        ]);
        let stats = results.memory_stats(TOP_MEMORY).unwrap();
        let text = render(|reporter, out| reporter.write_memory_stats(&stats, out));
        assert_eq!(
            text,
            indoc! {"
                Memory:
                  mean 2.25 MB, max 4.00 MB, total 4.50 MB
                Duration:
                  mean 250ms, max 250ms, total 500ms
                Top 2 by peak memory:
                     4.00 MB  TIMEOUT               big.js
                      512 KB  PASS                  small.js
            "}
        );
    }
}
