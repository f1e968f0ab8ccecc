// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::{Result, ensure};
use conformance_runner::{
    config::Workers,
    discovery::{SkipPolicy, discover_dir, discover_paths},
    errors::TestRunnerBuildError,
    results::{ResultSet, StatusTransition, TestResult, compute_diff},
    runner::{RunCancellation, TestRunnerBuilder},
    scheduler::TimingHistory,
    signal::SignalHandlerKind,
    status::TestStatus,
    store::ResultStore,
};
use pretty_assertions::assert_eq;
use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

fn builder(workers: usize) -> TestRunnerBuilder {
    let mut builder = TestRunnerBuilder::default();
    builder
        .set_workers(Workers::Count(workers))
        .set_timeout(Duration::from_secs(10));
    builder
}

fn statuses(results: &ResultSet) -> BTreeMap<String, TestStatus> {
    results
        .results()
        .iter()
        .map(|result| (result.path.to_string(), result.status))
        .collect()
}

#[test]
fn full_run_with_skips() -> Result<()> {
    test_init();
    let corpus = Corpus::new();
    let pass = corpus.add("built-ins/pass.js", "print PASS");
    let fail = corpus.add("built-ins/fail.js", "print FAIL: nope");
    let crash = corpus.add("language/crash.js", "exit 3");
    let skipped = corpus.add("intl402/locale.js", "print PASS");
    corpus.add("harness/helper_FIXTURE.js", "exit 1");

    let tests = discover_dir(corpus.root(), &SkipPolicy::default())?;
    ensure!(tests.total() == 4, "fixture excluded: {tests:?}");

    let runner = builder(4).build(fake_engine(), SignalHandlerKind::Noop)?;
    let mut seen = 0;
    let output = runner.run_with_callback(tests, &TimingHistory::new(), None, |_| seen += 1)?;

    ensure!(!output.cancelled, "run was not cancelled");
    ensure!(seen == 4, "callback saw every result");
    assert_eq!(
        statuses(&output.results),
        BTreeMap::from([
            (pass.to_string(), TestStatus::Pass),
            (fail.to_string(), TestStatus::Fail),
            (crash.to_string(), TestStatus::Crash),
            (skipped.to_string(), TestStatus::Skip),
        ])
    );

    let skip_result = output.results.get(&skipped).expect("skipped test has a result");
    assert_eq!(skip_result, &TestResult::skipped(skipped.clone()));

    let counts = output.results.counts();
    ensure!(counts.total() == 4, "counts match results");
    ensure!(output.summary.counts == *counts, "tracker agrees with result set");
    ensure!(output.summary.completed == 4, "all results tracked");
    ensure!(output.statistics.count == 3, "skipped tests are not scheduled");
    Ok(())
}

#[test]
fn run_against_baseline() -> Result<()> {
    test_init();
    let corpus = Corpus::new();
    let a = corpus.add("a.js", "print PASS");
    let b = corpus.add("b.js", "print FAIL: regressed");
    let c = corpus.add("c.js", "print PASS");

    let baseline = ResultSet::from_results(vec![
        TestResult {
            status: TestStatus::Crash,
            message: String::new(),
            path: a.clone(),
            memory_kb: 0,
            duration: Duration::from_millis(5),
        },
        TestResult {
            status: TestStatus::Pass,
            message: String::new(),
            path: b.clone(),
            memory_kb: 0,
            duration: Duration::from_secs(3),
        },
    ]);
    let history = TimingHistory::from_results(baseline.results());

    let tests = discover_dir(corpus.root(), &SkipPolicy::disabled())?;
    let runner = builder(2).build(fake_engine(), SignalHandlerKind::Noop)?;
    let output = runner.run(tests, &history, Some(&baseline))?;

    let summary = &output.summary;
    ensure!(summary.has_baseline, "baseline was used");
    assert_eq!(summary.gained[TestStatus::Pass], 1);
    assert_eq!(summary.lost[TestStatus::Pass], 1);
    assert_eq!(summary.gained[TestStatus::Fail], 1);
    assert_eq!(summary.lost[TestStatus::Crash], 1);

    let diff = compute_diff(&baseline, &output.results);
    assert_eq!(
        diff.get(StatusTransition::new(TestStatus::Crash, TestStatus::Pass)),
        [a.clone()]
    );
    assert_eq!(
        diff.get(StatusTransition::new(TestStatus::Pass, TestStatus::Fail)),
        [b.clone()]
    );
    ensure!(diff.len() == 2, "c.js is new, so it isn't a change");

    // A new full run replaces the baseline; a scoped rerun is merged into it.
    let merged = output.results.merge_into(&baseline);
    let order: Vec<_> = merged.results().iter().map(|r| r.path.clone()).collect();
    assert_eq!(order, [a, b, c]);
    Ok(())
}

#[test]
fn scoped_rerun_and_persist() -> Result<()> {
    test_init();
    let corpus = Corpus::new();
    let fixed = corpus.add("tests/fixed.js", "print PASS");
    let passing = corpus.add("tests/passing.js", "print PASS");
    let store = ResultStore::new(corpus.scratch("out/results.json"));

    let baseline = ResultSet::from_results(vec![
        TestResult::skipped(corpus.scratch("elsewhere.js")),
        TestResult {
            status: TestStatus::Fail,
            message: "FAIL".to_owned(),
            path: fixed.clone(),
            memory_kb: 10,
            duration: Duration::from_millis(20),
        },
        TestResult {
            status: TestStatus::Pass,
            message: "PASS".to_owned(),
            path: passing.clone(),
            memory_kb: 10,
            duration: Duration::from_millis(20),
        },
    ]);
    store.persist(&baseline)?;

    let locked = store.lock_exclusive()?;
    let baseline = locked.load()?.expect("baseline was persisted");
    let tests = discover_paths(
        corpus.root(),
        &[corpus.root().join("tests")],
        &SkipPolicy::default(),
        Some(&baseline.status_by_path()),
    );
    assert_eq!(tests.to_run, [fixed.clone()], "passing tests are not rerun");

    let runner = builder(1).build(fake_engine(), SignalHandlerKind::Noop)?;
    let history = TimingHistory::from_results(baseline.results());
    let output = runner.run(tests, &history, Some(&baseline))?;
    let merged = output.results.merge_into(&baseline);
    locked.persist(&merged)?;

    let reloaded = store.load()?.expect("merged results were persisted");
    assert_eq!(reloaded.total(), 3);
    assert_eq!(
        reloaded.get(&fixed).map(|r| r.status),
        Some(TestStatus::Pass)
    );
    assert_eq!(reloaded.counts()[TestStatus::Skip], 1);
    assert_eq!(reloaded.counts()[TestStatus::Fail], 0);
    Ok(())
}

#[test]
fn cancellation_stops_the_run() -> Result<()> {
    test_init();
    let corpus = Corpus::new();
    for i in 0..8 {
        corpus.add(&format!("slow/{i}.js"), "sleep 20000\nprint PASS");
    }
    let tests = discover_dir(corpus.root(), &SkipPolicy::default())?;

    let cancellation = RunCancellation::new();
    let mut builder = builder(2);
    builder.set_cancellation(cancellation.clone());
    let runner = builder.build(fake_engine(), SignalHandlerKind::Noop)?;

    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(300));
        cancellation.cancel();
    });

    let start = Instant::now();
    let output = runner.run(tests, &TimingHistory::new(), None)?;
    canceller.join().expect("canceller thread doesn't panic");

    ensure!(output.cancelled, "run reports cancellation");
    ensure!(
        output.results.is_empty(),
        "killed tests are not recorded: {:?}",
        output.results
    );
    ensure!(
        start.elapsed() < Duration::from_secs(10),
        "run stopped promptly: {:?}",
        start.elapsed()
    );
    Ok(())
}

#[test]
fn cancellation_keeps_completed_results() -> Result<()> {
    test_init();
    let corpus = Corpus::new();
    let quick: Vec<_> = (0..4)
        .map(|i| corpus.add(&format!("a-quick/{i}.js"), "print PASS"))
        .collect();
    for i in 0..4 {
        corpus.add(&format!("z-slow/{i}.js"), "sleep 20000\nprint PASS");
    }
    let tests = discover_dir(corpus.root(), &SkipPolicy::default())?;

    let runner = builder(2).build(fake_engine(), SignalHandlerKind::Noop)?;
    let cancellation = runner.cancellation();
    let mut seen = 0;
    let start = Instant::now();
    // Quick tests sort first, so the slow ones are in flight or queued once these are all in.
    let output = runner.run_with_callback(tests, &TimingHistory::new(), None, |_| {
        seen += 1;
        if seen == quick.len() {
            cancellation.cancel();
        }
    })?;

    ensure!(output.cancelled, "run reports cancellation");
    ensure!(
        start.elapsed() < Duration::from_secs(10),
        "run stopped promptly: {:?}",
        start.elapsed()
    );
    assert_eq!(
        statuses(&output.results),
        quick
            .iter()
            .map(|path| (path.to_string(), TestStatus::Pass))
            .collect::<BTreeMap<_, _>>(),
        "completed tests are kept and killed ones are dropped"
    );
    assert_eq!(&output.summary.counts, output.results.counts());
    assert_eq!(output.summary.completed, quick.len());
    Ok(())
}

#[test]
fn invalid_builder_settings() {
    let mut zero_workers = TestRunnerBuilder::default();
    zero_workers.set_workers(Workers::Count(0));
    assert!(matches!(
        zero_workers.build(fake_engine(), SignalHandlerKind::Noop),
        Err(TestRunnerBuildError::ZeroWorkers)
    ));

    let mut zero_timeout = TestRunnerBuilder::default();
    zero_timeout.set_timeout(Duration::ZERO);
    assert!(matches!(
        zero_timeout.build(fake_engine(), SignalHandlerKind::Noop),
        Err(TestRunnerBuildError::ZeroTimeout)
    ));
}
