// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::Executor;
use crate::{
    config::Workers,
    discovery::DiscoveredTests,
    engine_timings::EngineTimings,
    errors::{TestRunnerBuildError, TestRunnerExecuteErrors},
    progress::{ProgressTracker, Summary},
    results::{ResultSet, TestResult},
    scheduler::{ScheduleStatistics, TestJob, TimingHistory, schedule},
    signal::{SignalHandler, SignalHandlerKind},
    time::stopwatch,
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use std::{sync::Arc, time::Duration};
use tokio::{
    runtime::Runtime,
    sync::{Mutex, mpsc, watch},
    task::{JoinError, JoinSet},
};
use tracing::{debug, info, warn};

/// The job queue and the results channel each hold this many entries per worker.
const CHANNEL_CAPACITY_PER_WORKER: usize = 8;

/// A handle for aborting a run. Clones share the same state.
#[derive(Clone, Debug)]
pub struct RunCancellation {
    sender: Arc<watch::Sender<bool>>,
}

impl RunCancellation {
    /// Creates a new, uncancelled handle.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Aborts the run: no further tests are dispatched, and running tests are killed and not
    /// recorded.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Returns true if [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> CancelReceiver {
        CancelReceiver {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for RunCancellation {
    fn default() -> Self {
        Self::new()
    }
}

struct CancelReceiver {
    receiver: watch::Receiver<bool>,
}

impl CancelReceiver {
    /// Completes once the run is cancelled.
    async fn cancelled(&mut self) {
        if self.receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            // The handle is gone, so cancellation can't happen anymore.
            std::future::pending::<()>().await;
        }
    }
}

/// Test runner options.
#[derive(Debug, Default)]
pub struct TestRunnerBuilder {
    workers: Option<Workers>,
    timeout: Option<Duration>,
    sample_interval: Option<Duration>,
    engine_timings: Option<Arc<EngineTimings>>,
    cancellation: Option<RunCancellation>,
}

impl TestRunnerBuilder {
    /// Sets the number of tests to run at once. Defaults to [`Workers::NumCpus`].
    pub fn set_workers(&mut self, workers: Workers) -> &mut Self {
        self.workers = Some(workers);
        self
    }

    /// Sets the per-test deadline.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the memory sampling interval.
    pub fn set_sample_interval(&mut self, sample_interval: Duration) -> &mut Self {
        self.sample_interval = Some(sample_interval);
        self
    }

    /// Collects engine phase timings into `timings`.
    pub fn set_engine_timings(&mut self, timings: Arc<EngineTimings>) -> &mut Self {
        self.engine_timings = Some(timings);
        self
    }

    /// Uses an existing cancellation handle, so the run can be aborted from elsewhere.
    pub fn set_cancellation(&mut self, cancellation: RunCancellation) -> &mut Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Creates a new test runner for `engine`.
    pub fn build(
        self,
        engine: &Utf8Path,
        signal_handler: SignalHandlerKind,
    ) -> Result<TestRunner, TestRunnerBuildError> {
        let workers = self.workers.unwrap_or(Workers::NumCpus).compute();
        if workers == 0 {
            return Err(TestRunnerBuildError::ZeroWorkers);
        }

        let mut executor = Executor::new(engine);
        if let Some(timeout) = self.timeout {
            if timeout.is_zero() {
                return Err(TestRunnerBuildError::ZeroTimeout);
            }
            executor.set_timeout(timeout);
        }
        if let Some(sample_interval) = self.sample_interval {
            if sample_interval.is_zero() {
                return Err(TestRunnerBuildError::ZeroSampleInterval);
            }
            executor.set_sample_interval(sample_interval);
        }
        if let Some(timings) = self.engine_timings {
            executor.set_engine_timings(timings);
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("conformance-runner-worker")
            .build()
            .map_err(TestRunnerBuildError::TokioRuntimeCreate)?;
        let _guard = runtime.enter();

        // Signal streams register with the runtime's driver, so this must happen inside the guard.
        let signal_handler = signal_handler.build()?;

        Ok(TestRunner {
            workers,
            executor,
            cancellation: self.cancellation.unwrap_or_default(),
            signal_handler,
            runtime,
        })
    }
}

/// Runs tests on a pool of workers.
///
/// Created using [`TestRunnerBuilder::build`].
#[derive(Debug)]
pub struct TestRunner {
    workers: usize,
    executor: Executor,
    cancellation: RunCancellation,
    signal_handler: SignalHandler,
    runtime: Runtime,
}

impl TestRunner {
    /// Returns the number of workers.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Returns a handle that aborts this run when cancelled.
    pub fn cancellation(&self) -> RunCancellation {
        self.cancellation.clone()
    }

    /// Runs `tests`, ordered using `history`.
    ///
    /// Tests in [`skipped`](DiscoveredTests::skipped) are recorded as skipped without running.
    /// If `baseline` is given, progress reports status changes against it.
    ///
    /// Returns an error if any worker task panicked.
    pub fn run(
        self,
        tests: DiscoveredTests,
        history: &TimingHistory,
        baseline: Option<&ResultSet>,
    ) -> Result<RunOutput, TestRunnerExecuteErrors> {
        self.run_with_callback(tests, history, baseline, |_| {})
    }

    /// Like [`run`](Self::run), calling `callback` with each result as it is recorded.
    pub fn run_with_callback<F>(
        self,
        tests: DiscoveredTests,
        history: &TimingHistory,
        baseline: Option<&ResultSet>,
        mut callback: F,
    ) -> Result<RunOutput, TestRunnerExecuteErrors>
    where
        F: FnMut(&TestResult),
    {
        let Self {
            workers,
            executor,
            cancellation,
            mut signal_handler,
            runtime,
        } = self;

        let stopwatch = stopwatch();
        let DiscoveredTests {
            to_run, skipped, ..
        } = tests;

        // Scheduling stats every file, so it's done before entering the runtime.
        let jobs = schedule(&to_run, history);
        let statistics = ScheduleStatistics::compute(&jobs);
        statistics.log();

        let total = jobs.len() + skipped.len();
        let tracker = ProgressTracker::new(total, baseline.map(ResultSet::status_by_path));
        let mut results = ResultSet::with_capacity(total);
        info!("running {} tests with {workers} workers", jobs.len());

        let pool = WorkerPool {
            workers,
            executor: Arc::new(executor),
            cancellation: &cancellation,
        };
        let join_errors = runtime.block_on(pool.run(
            jobs,
            skipped,
            &mut signal_handler,
            |result| {
                tracker.add(&result);
                callback(&result);
                results.add(result);
            },
        ));

        // Background tasks may still be reading from pipes of killed processes. Don't wait for
        // them.
        runtime.shutdown_background();

        if !join_errors.is_empty() {
            return Err(TestRunnerExecuteErrors { join_errors });
        }

        let cancelled = cancellation.is_cancelled();
        if cancelled {
            warn!(
                "run cancelled after {} of {total} results",
                results.total()
            );
        }

        let snapshot = stopwatch.snapshot();
        Ok(RunOutput {
            results,
            summary: tracker.finish(),
            statistics,
            cancelled,
            start_time: snapshot.start_time,
            elapsed: snapshot.duration,
        })
    }
}

/// The outcome of [`TestRunner::run`].
#[derive(Clone, Debug)]
pub struct RunOutput {
    /// Every recorded result, in completion order.
    pub results: ResultSet,

    /// Final counts and baseline deltas.
    pub summary: Summary,

    /// Statistics over the scheduled jobs.
    pub statistics: ScheduleStatistics,

    /// Whether the run was aborted. If so, `results` contains only tests that completed.
    pub cancelled: bool,

    /// When the run started.
    pub start_time: DateTime<Local>,

    /// How long the run took.
    pub elapsed: Duration,
}

struct WorkerPool<'a> {
    workers: usize,
    executor: Arc<Executor>,
    cancellation: &'a RunCancellation,
}

impl WorkerPool<'_> {
    /// Runs all jobs, passing results to `record` on the current task. Returns errors from tasks
    /// that panicked.
    async fn run(
        self,
        jobs: Vec<TestJob>,
        skipped: Vec<Utf8PathBuf>,
        signal_handler: &mut SignalHandler,
        mut record: impl FnMut(TestResult),
    ) -> Vec<JoinError> {
        let capacity = self.workers * CHANNEL_CAPACITY_PER_WORKER;
        let (job_tx, job_rx) = mpsc::channel::<Utf8PathBuf>(capacity);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<TestResult>(capacity);

        let mut tasks = JoinSet::new();
        tasks.spawn(produce(
            jobs,
            skipped,
            job_tx,
            result_tx.clone(),
            self.cancellation.subscribe(),
        ));
        for worker in 0..self.workers {
            tasks.spawn(work(
                worker,
                self.executor.clone(),
                job_rx.clone(),
                result_tx.clone(),
                self.cancellation.subscribe(),
            ));
        }
        // The results channel closes once every task is done with it.
        drop(result_tx);

        let mut signals_done = false;
        loop {
            tokio::select! {
                result = result_rx.recv() => match result {
                    Some(result) => record(result),
                    None => break,
                },
                signal = signal_handler.recv(), if !signals_done => match signal {
                    Some(signal) => {
                        info!("received {signal} signal, cancelling run");
                        self.cancellation.cancel();
                    }
                    None => signals_done = true,
                },
            }
        }

        let mut join_errors = Vec::new();
        while let Some(res) = tasks.join_next().await {
            if let Err(error) = res {
                join_errors.push(error);
            }
        }
        join_errors
    }
}

/// Feeds scheduled jobs to the workers, then records a skip result for every skipped test.
async fn produce(
    jobs: Vec<TestJob>,
    skipped: Vec<Utf8PathBuf>,
    job_tx: mpsc::Sender<Utf8PathBuf>,
    result_tx: mpsc::Sender<TestResult>,
    mut cancel: CancelReceiver,
) {
    for job in jobs {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            res = job_tx.send(job.path) => {
                if res.is_err() {
                    return;
                }
            }
        }
    }
    // Closing the queue lets idle workers exit.
    drop(job_tx);

    for path in skipped {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            res = result_tx.send(TestResult::skipped(path)) => {
                if res.is_err() {
                    return;
                }
            }
        }
    }
}

async fn work(
    worker: usize,
    executor: Arc<Executor>,
    job_rx: Arc<Mutex<mpsc::Receiver<Utf8PathBuf>>>,
    result_tx: mpsc::Sender<TestResult>,
    mut cancel: CancelReceiver,
) {
    loop {
        let next = async { job_rx.lock().await.recv().await };
        let path = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            path = next => match path {
                Some(path) => path,
                None => break,
            },
        };

        let Some(result) = executor.execute_cancellable(&path, cancel.cancelled()).await else {
            break;
        };
        if result_tx.send(result).await.is_err() {
            break;
        }
    }
    debug!("worker {worker} exiting");
}
