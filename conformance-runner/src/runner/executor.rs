// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    classify::{ChildExit, ChildObservation, classify},
    engine_command::EngineCommand,
    engine_timings::EngineTimings,
    memory,
    results::TestResult,
    time::stopwatch,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// The default per-test deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The default memory sampling interval.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(10);

/// How long output is still read after the engine exits.
///
/// A grandchild that inherited the pipe can keep it open indefinitely.
pub const LEAK_TIMEOUT: Duration = Duration::from_millis(100);

/// Runs single tests under the engine.
#[derive(Clone, Debug)]
pub struct Executor {
    engine: Utf8PathBuf,
    timeout: Duration,
    sample_interval: Duration,
    leak_timeout: Duration,
    timings: Option<Arc<EngineTimings>>,
}

impl Executor {
    /// Creates an executor for the given engine binary with default settings.
    pub fn new(engine: impl Into<Utf8PathBuf>) -> Self {
        Self {
            engine: engine.into(),
            timeout: DEFAULT_TIMEOUT,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            leak_timeout: LEAK_TIMEOUT,
            timings: None,
        }
    }

    /// Sets the per-test deadline.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Sets how often memory is sampled.
    pub fn set_sample_interval(&mut self, sample_interval: Duration) -> &mut Self {
        self.sample_interval = sample_interval;
        self
    }

    /// Collects engine phase timings from every completed test into `timings`.
    pub fn set_engine_timings(&mut self, timings: Arc<EngineTimings>) -> &mut Self {
        self.timings = Some(timings);
        self
    }

    /// Runs one test to completion.
    ///
    /// Never fails: problems running the engine are recorded in the result's status.
    pub async fn execute(&self, path: &Utf8Path) -> TestResult {
        match self.execute_cancellable(path, std::future::pending()).await {
            Some(result) => result,
            None => unreachable!("a pending future never completes"),
        }
    }

    /// Runs one test, stopping early if `cancel` completes first.
    ///
    /// On cancellation the engine's process group is killed and reaped, and `None` is returned.
    pub async fn execute_cancellable(
        &self,
        path: &Utf8Path,
        cancel: impl Future<Output = ()>,
    ) -> Option<TestResult> {
        let stopwatch = stopwatch();

        let mut child = match EngineCommand::new(&self.engine, path).spawn() {
            Ok(child) => child,
            Err(error) => {
                debug!("failed to spawn {} for {path}: {error}", self.engine);
                return Some(TestResult {
                    status: classify(ChildObservation::start_failed(), ""),
                    message: format!("failed to start process: {error}"),
                    path: path.to_owned(),
                    memory_kb: 0,
                    duration: stopwatch.snapshot().duration,
                });
            }
        };
        let pid = child.child.id();
        debug!("started {path} (pid {pid:?})");

        let mut sampler = tokio::time::interval(self.sample_interval);
        sampler.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut peak_kb = 0;

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);
        tokio::pin!(cancel);
        let mut deadline_exceeded = false;

        let exit = loop {
            tokio::select! {
                () = child.output.fill_buf(), if !child.output.is_done() => {}
                res = child.child.wait() => {
                    break match res {
                        Ok(status) if status.success() => ChildExit::Success,
                        Ok(_) => ChildExit::Failure,
                        Err(error) => {
                            debug!("error waiting for {path}: {error}");
                            ChildExit::NotObserved
                        }
                    };
                }
                _ = sampler.tick() => {
                    if let Some(pid) = pid {
                        if let Some(kb) = memory::sample_rss_kb(pid).await {
                            peak_kb = peak_kb.max(kb);
                        }
                    }
                }
                () = &mut deadline, if !deadline_exceeded => {
                    debug!("{path} exceeded the {:?} deadline, killing it", self.timeout);
                    deadline_exceeded = true;
                    // The loop continues until the killed process is reaped.
                    child.kill();
                }
                () = &mut cancel => {
                    debug!("run cancelled, killing {path}");
                    child.kill();
                    // Errors here mean the child is already gone.
                    _ = child.child.wait().await;
                    return None;
                }
            }
        };

        let leak = tokio::time::sleep(self.leak_timeout);
        tokio::pin!(leak);
        while !child.output.is_done() {
            tokio::select! {
                biased;
                () = child.output.fill_buf() => {}
                () = &mut leak => {
                    debug!("{path}: output pipe still open {:?} after exit", self.leak_timeout);
                    break;
                }
            }
        }
        if let Some(error) = child.output.error() {
            debug!("error reading output of {path}: {error}");
        }

        let duration = stopwatch.snapshot().duration;
        let output = child.output.to_string_lossy();
        let status = classify(
            ChildObservation {
                deadline_exceeded,
                exit,
            },
            &output,
        );
        debug!("finished {path}: {status} in {duration:?}");

        let message = if deadline_exceeded {
            "test timed out".to_owned()
        } else {
            if let Some(timings) = &self.timings {
                timings.record(&output);
            }
            output
        };

        Some(TestResult {
            status,
            message,
            path: path.to_owned(),
            memory_kb: peak_kb,
            duration,
        })
    }
}
