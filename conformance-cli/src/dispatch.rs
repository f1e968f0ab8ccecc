// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ConformanceExitCode,
    errors::{ExpectedError, Result},
    output::{OutputContext, OutputOpts, clap_styles},
    reporter::{Reporter, TOP_MEMORY},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand, ValueEnum};
use conformance_runner::{
    config::{ConformanceConfig, ConformanceProfile, Workers},
    discovery::{DiscoveredTests, SkipPolicy, discover_dir, discover_paths},
    engine_timings::EngineTimings,
    results::{ResultSet, compute_diff, parse_transition_filter},
    runner::TestRunnerBuilder,
    scheduler::TimingHistory,
    signal::SignalHandlerKind,
    store::{ResultStore, read_compact, write_compact},
};
use std::{
    io::{BufWriter, Write},
    sync::Arc,
    time::Duration,
};
use tracing::{info, warn};

/// Runs an engine against a conformance suite and tracks results across runs.
#[derive(Debug, Parser)]
#[command(version, styles = clap_styles::style())]
pub struct ConformanceApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[clap(subcommand)]
    command: Command,
}

impl ConformanceApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        match self.command {
            Command::Run(opts) => {
                let config = self.config_opts.make_config()?;
                let profile = config.profile(&self.config_opts.profile)?;
                opts.exec(&profile, output)
            }
            Command::Diff {
                old,
                new,
                filter,
                format,
            } => {
                let filter = filter.as_deref().map(parse_transition_filter).transpose()?;
                let old = format.load(&old)?;
                let new = format.load(&new)?;
                let diff = compute_diff(&old, &new);

                let styles = output.stdout_styles();
                let reporter = Reporter::new(&styles, output.verbose);
                write_stdout(|out| reporter.write_diff(&diff, filter.as_deref(), Some(&new), out))?;
                Ok(ConformanceExitCode::OK)
            }
            Command::Merge {
                partial,
                baseline,
                output: merged_path,
            } => {
                let partial = ResultsFormat::Full.load(&partial)?;
                let merged_path = merged_path.unwrap_or_else(|| baseline.clone());

                let store = ResultStore::new(merged_path);
                let locked = store.lock_exclusive()?;
                let merged = match ResultStore::new(&baseline).load()? {
                    Some(baseline) => partial.merge_into(&baseline),
                    None => {
                        info!("no baseline at `{baseline}`, writing partial results as is");
                        partial
                    }
                };
                locked.persist(&merged)?;
                info!("wrote {} results to {}", merged.total(), store.path());

                let styles = output.stdout_styles();
                let reporter = Reporter::new(&styles, output.verbose);
                write_stdout(|out| reporter.write_totals(&merged, out))?;
                Ok(ConformanceExitCode::OK)
            }
            Command::Compact {
                results,
                root,
                output: compact_path,
            } => {
                let results = ResultsFormat::Full.load(&results)?;
                write_compact(&results, &compact_path, &root)?;
                info!("wrote {} compact results to {compact_path}", results.total());
                Ok(ConformanceExitCode::OK)
            }
        }
    }
}

#[derive(Debug, Args)]
struct ConfigOpts {
    /// Config file [default: .config/conformance.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    /// Config profile to use
    #[arg(
        long,
        short = 'P',
        global = true,
        value_name = "PROFILE",
        env = "CONFORMANCE_PROFILE",
        default_value = ConformanceConfig::DEFAULT_PROFILE,
    )]
    profile: String,
}

impl ConfigOpts {
    fn make_config(&self) -> Result<ConformanceConfig> {
        Ok(ConformanceConfig::from_sources(self.config_file.as_deref())?)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run tests and update the result file
    ///
    /// Without paths, every test under the profile's test root is run and the result file is
    /// replaced. With paths or --failed-only, only those tests are run and their results are
    /// merged into the result file.
    Run(RunOpts),

    /// Show tests whose status changed between two result files
    Diff {
        /// The older result file
        old: Utf8PathBuf,

        /// The newer result file
        new: Utf8PathBuf,

        /// Only show these transitions, e.g. "PASS->FAIL,PASS->CRASH"
        #[arg(long, value_name = "TRANSITIONS")]
        filter: Option<String>,

        /// Format of both result files
        #[arg(long, value_enum, default_value_t)]
        format: ResultsFormat,
    },

    /// Merge partial results into a baseline
    ///
    /// Results in PARTIAL replace the baseline's results for the same test. Other baseline
    /// results are kept, and new tests are appended.
    Merge {
        /// Result file from a scoped run
        partial: Utf8PathBuf,

        /// The result file to merge into
        baseline: Utf8PathBuf,

        /// Where to write the merged results [default: BASELINE]
        #[arg(long, short, value_name = "PATH")]
        output: Option<Utf8PathBuf>,
    },

    /// Write results in the compact archival form
    Compact {
        /// Result file to convert
        results: Utf8PathBuf,

        /// Test paths are written relative to this directory
        #[arg(long, value_name = "DIR")]
        root: Utf8PathBuf,

        /// Where to write the compact results
        #[arg(long, short, value_name = "PATH")]
        output: Utf8PathBuf,
    },
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
enum ResultsFormat {
    /// The result file written by `run`
    #[default]
    Full,

    /// The form written by `compact`
    Compact,
}

impl ResultsFormat {
    /// Loads a result file that must exist.
    fn load(self, path: &Utf8Path) -> Result<ResultSet> {
        match self {
            Self::Full => ResultStore::new(path)
                .load()?
                .ok_or_else(|| ExpectedError::ResultsNotFound {
                    path: path.to_owned(),
                }),
            Self::Compact => {
                if !path.exists() {
                    return Err(ExpectedError::ResultsNotFound {
                        path: path.to_owned(),
                    });
                }
                Ok(read_compact(path)?)
            }
        }
    }
}

#[derive(Debug, Args)]
struct RunOpts {
    /// Test files or directories to run [default: the profile's test root]
    #[arg(value_name = "PATHS")]
    paths: Vec<Utf8PathBuf>,

    /// Engine binary [default: from profile]
    #[arg(long, value_name = "PATH", env = "CONFORMANCE_ENGINE")]
    engine: Option<Utf8PathBuf>,

    /// Directory containing the test suite [default: from profile]
    #[arg(long, value_name = "DIR")]
    test_root: Option<Utf8PathBuf>,

    /// Result file to load the baseline from and write to [default: from profile]
    #[arg(long, value_name = "PATH")]
    results: Option<Utf8PathBuf>,

    /// Number of tests to run at once: an integer, "num-cpus", or a negative offset from the
    /// default [default: from profile]
    #[arg(long, short = 'j', value_name = "WORKERS", allow_negative_numbers = true)]
    workers: Option<Workers>,

    /// Per-test timeout, e.g. "30s" [default: from profile]
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Run tests that the skip policy would exclude
    #[arg(long)]
    no_skip: bool,

    /// Only run tests that did not pass in the baseline
    #[arg(long)]
    failed_only: bool,

    /// Don't show status changes against the baseline
    #[arg(long)]
    no_diff: bool,

    /// Only show these transitions, e.g. "PASS->FAIL,PASS->CRASH"
    #[arg(long, value_name = "TRANSITIONS", conflicts_with = "no_diff")]
    diff_filter: Option<String>,

    /// Show memory, duration and engine timing statistics
    #[arg(long)]
    stats: bool,

    /// Collect engine phase timings [default: from profile]
    #[arg(long)]
    engine_timings: bool,

    /// Don't write the result file
    #[arg(long)]
    no_persist: bool,
}

impl RunOpts {
    fn exec(self, profile: &ConformanceProfile, output: OutputContext) -> Result<i32> {
        // Parse the filter up front so a typo doesn't cost a whole run.
        let diff_filter = self
            .diff_filter
            .as_deref()
            .map(parse_transition_filter)
            .transpose()?;

        let engine = self.engine.as_deref().unwrap_or(profile.engine());
        let test_root = self.test_root.as_deref().unwrap_or(profile.test_root());
        let results_path = self.results.as_deref().unwrap_or(profile.results_path());
        let scoped = !self.paths.is_empty() || self.failed_only;

        // The lock is held until the new results are written, so concurrent runs against the
        // same file serialize.
        let store = ResultStore::new(results_path);
        let locked = store.lock_exclusive()?;
        let baseline = match locked.load() {
            Ok(Some(baseline)) => {
                info!(
                    "loaded baseline with {} results from {results_path}",
                    baseline.total()
                );
                Some(baseline)
            }
            Ok(None) => {
                info!("no baseline at {results_path}");
                None
            }
            // Scoped results are merged into the baseline, so they need a readable one.
            Err(err) if scoped && !self.no_persist => {
                return Err(ExpectedError::UnreadableBaseline { err });
            }
            Err(error) => {
                warn!("ignoring unreadable baseline: {error}");
                None
            }
        };

        let policy = if self.no_skip {
            SkipPolicy::disabled()
        } else {
            profile.skip_policy()
        };
        let tests = self.discover(test_root, &policy, baseline.as_ref())?;

        let history = baseline
            .as_ref()
            .map_or_else(TimingHistory::new, |baseline| {
                TimingHistory::from_results(baseline.results())
            });

        let timings = (self.engine_timings || profile.engine_timings())
            .then(|| Arc::new(EngineTimings::new()));
        let mut builder = TestRunnerBuilder::default();
        builder
            .set_workers(self.workers.unwrap_or(profile.workers()))
            .set_timeout(self.timeout.unwrap_or(profile.timeout()))
            .set_sample_interval(profile.sample_interval());
        if let Some(timings) = &timings {
            builder.set_engine_timings(timings.clone());
        }
        let runner = builder.build(engine, SignalHandlerKind::Standard)?;

        let total = tests.total();
        let run = runner.run(tests, &history, baseline.as_ref())?;

        let styles = output.stdout_styles();
        let reporter = Reporter::new(&styles, output.verbose);
        write_stdout(|out| {
            reporter.write_summary(&run.summary, run.elapsed, out)?;
            if let (Some(baseline), false) = (&baseline, self.no_diff) {
                writeln!(out)?;
                let diff = compute_diff(baseline, &run.results);
                reporter.write_diff(&diff, diff_filter.as_deref(), Some(&run.results), out)?;
            }
            if self.stats {
                if let Some(stats) = run.results.memory_stats(TOP_MEMORY) {
                    writeln!(out)?;
                    reporter.write_memory_stats(&stats, out)?;
                }
                if let Some(timings) = &timings {
                    writeln!(out)?;
                    reporter.write_engine_timings(&timings.report(), out)?;
                }
            }
            Ok(())
        })?;

        if run.cancelled {
            return Err(ExpectedError::RunCancelled {
                completed: run.results.total(),
                total,
            });
        }

        if self.no_persist {
            return Ok(ConformanceExitCode::OK);
        }
        let persisted = match (&baseline, scoped) {
            (Some(baseline), true) => run.results.merge_into(baseline),
            _ => run.results,
        };
        locked.persist(&persisted)?;
        info!("wrote {} results to {results_path}", persisted.total());

        if scoped && baseline.is_some() {
            write_stdout(|out| {
                writeln!(out)?;
                reporter.write_totals(&persisted, out)
            })?;
        }
        Ok(ConformanceExitCode::OK)
    }

    fn discover(
        &self,
        test_root: &Utf8Path,
        policy: &SkipPolicy,
        baseline: Option<&ResultSet>,
    ) -> Result<DiscoveredTests> {
        if self.paths.is_empty() && !self.failed_only {
            return Ok(discover_dir(test_root, policy)?);
        }

        let failed_only = if self.failed_only {
            if baseline.is_none() {
                warn!("--failed-only has no baseline to filter against, running every test");
            }
            baseline.map(ResultSet::status_by_path)
        } else {
            None
        };
        let paths = if self.paths.is_empty() {
            vec![test_root.to_owned()]
        } else {
            self.paths.clone()
        };

        let tests = discover_paths(test_root, &paths, policy, failed_only.as_ref());
        if tests.total() == 0 && !tests.errors.is_empty() {
            return Err(ExpectedError::TestPathsNotFound {
                paths: tests.errors,
            });
        }
        Ok(tests)
    }
}

fn write_stdout(
    f: impl FnOnce(&mut BufWriter<std::io::StdoutLock<'static>>) -> std::io::Result<()>,
) -> Result<()> {
    let mut out = BufWriter::new(std::io::stdout().lock());
    f(&mut out)
        .and_then(|()| out.flush())
        .map_err(ExpectedError::write_output_error)
}
