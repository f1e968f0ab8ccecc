// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::{Result, ensure};
use conformance_runner::{
    engine_timings::{EnginePhase, EngineTimings},
    runner::Executor,
    status::TestStatus,
};
use indoc::indoc;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use test_case::test_case;

#[test_case("print PASS", TestStatus::Pass; "pass")]
#[test_case("print Test262:AsyncTestComplete", TestStatus::Pass; "async pass")]
#[test_case("print FAIL: expected 1 got 2", TestStatus::Fail; "fail")]
#[test_case("print SKIP feature", TestStatus::Skip; "engine skip")]
#[test_case("print all good", TestStatus::Crash; "clean exit without verdict")]
#[test_case("print PASS\nexit 1", TestStatus::Crash; "verdict with nonzero exit")]
#[test_case("print PARSE_ERROR: unexpected token\nexit 1", TestStatus::ParseError; "parse error")]
#[test_case("print PARSE_SUCCESS_ERROR\nexit 1", TestStatus::ParseSuccessError; "parse success error")]
#[test_case(
    indoc! {"
        eprint thread 'main' panicked at src/eval.rs:10:5:
        eprint not yet implemented: with statement
        exit 101
    "},
    TestStatus::NotImplemented;
    "not implemented panic"
)]
#[tokio::test]
async fn classifies_engine_output(contents: &str, expected: TestStatus) -> Result<()> {
    test_init();
    let corpus = Corpus::new();
    let path = corpus.add("test.js", contents);

    let result = Executor::new(fake_engine()).execute(&path).await;
    ensure!(
        result.status == expected,
        "expected {expected}, got {} (output: {:?})",
        result.status,
        result.message
    );
    ensure!(result.path == path, "result path matches");
    Ok(())
}

#[tokio::test]
async fn output_is_combined() -> Result<()> {
    test_init();
    let corpus = Corpus::new();
    let path = corpus.add("test.js", "eprint to stderr\nprint PASS\n");

    let result = Executor::new(fake_engine()).execute(&path).await;
    ensure!(result.message.contains("to stderr"), "stderr captured");
    ensure!(result.message.contains("PASS"), "stdout captured");
    Ok(())
}

#[tokio::test]
async fn timeout_kills_engine() -> Result<()> {
    test_init();
    let corpus = Corpus::new();
    let pidfile = corpus.scratch("engine.pid");
    let path = corpus.add("slow.js", &format!("pidfile {pidfile}\nsleep 20000\nprint PASS\n"));

    let start = Instant::now();
    let mut executor = Executor::new(fake_engine());
    executor.set_timeout(Duration::from_millis(300));
    let result = executor.execute(&path).await;
    let elapsed = start.elapsed();

    ensure!(
        result.status == TestStatus::Timeout,
        "status is TIMEOUT: {result:?}"
    );
    ensure!(result.message == "test timed out", "timeout message");
    ensure!(elapsed < Duration::from_secs(5), "returned promptly: {elapsed:?}");

    #[cfg(unix)]
    {
        let pid: u32 = std::fs::read_to_string(&pidfile)?.trim().parse()?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        ensure!(!process_exists(pid), "engine process {pid} is gone");
    }
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn timeout_kills_process_group() -> Result<()> {
    test_init();
    let corpus = Corpus::new();
    let path = corpus.add("orphan.js", "orphan 20000\nsleep 20000\n");

    let start = Instant::now();
    let mut executor = Executor::new(fake_engine());
    executor.set_timeout(Duration::from_millis(300));
    let result = executor.execute(&path).await;

    ensure!(result.status == TestStatus::Timeout, "status is TIMEOUT");
    // If the grandchild survived, it would hold the pipe open until the leak timeout.
    ensure!(
        start.elapsed() < Duration::from_secs(5),
        "returned promptly: {:?}",
        start.elapsed()
    );
    Ok(())
}

#[tokio::test]
async fn leaked_pipe_does_not_block() -> Result<()> {
    test_init();
    let corpus = Corpus::new();
    let path = corpus.add("leak.js", "print PASS\norphan 10000\n");

    let start = Instant::now();
    let result = Executor::new(fake_engine()).execute(&path).await;
    ensure!(result.status == TestStatus::Pass, "status is PASS: {result:?}");
    ensure!(
        start.elapsed() < Duration::from_secs(5),
        "leak timeout bounded the read: {:?}",
        start.elapsed()
    );
    Ok(())
}

#[tokio::test]
async fn spawn_failure_is_runner_error() -> Result<()> {
    test_init();
    let corpus = Corpus::new();
    let path = corpus.add("test.js", "print PASS");

    let result = Executor::new(corpus.scratch("no-such-engine"))
        .execute(&path)
        .await;
    ensure!(
        result.status == TestStatus::RunnerError,
        "status is RUNNER_ERROR: {result:?}"
    );
    ensure!(
        result.message.starts_with("failed to start process: "),
        "message: {}",
        result.message
    );
    ensure!(result.memory_kb == 0, "no memory measured");
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn samples_peak_memory() -> Result<()> {
    test_init();
    let corpus = Corpus::new();
    let path = corpus.add("alloc.js", "alloc 64\nsleep 300\nprint PASS\n");

    let result = Executor::new(fake_engine()).execute(&path).await;
    ensure!(result.status == TestStatus::Pass, "status is PASS: {result:?}");
    ensure!(
        result.memory_kb >= 32 * 1024,
        "peak memory includes the allocation: {} KiB",
        result.memory_kb
    );
    Ok(())
}

#[tokio::test]
async fn cancellation_kills_engine() -> Result<()> {
    test_init();
    let corpus = Corpus::new();
    let path = corpus.add("slow.js", "sleep 20000\nprint PASS\n");

    let start = Instant::now();
    let result = Executor::new(fake_engine())
        .execute_cancellable(&path, tokio::time::sleep(Duration::from_millis(200)))
        .await;
    ensure!(result.is_none(), "cancelled execution has no result");
    ensure!(
        start.elapsed() < Duration::from_secs(5),
        "returned promptly: {:?}",
        start.elapsed()
    );
    Ok(())
}

#[tokio::test]
async fn records_engine_timings() -> Result<()> {
    test_init();
    let corpus = Corpus::new();
    let path = corpus.add(
        "timed.js",
        indoc! {"
            print PASS
            print TOTAL: 4000
            print PARSE: 1000
        "},
    );

    let timings = Arc::new(EngineTimings::new());
    let mut executor = Executor::new(fake_engine());
    executor.set_engine_timings(timings.clone());
    let result = executor.execute(&path).await;
    ensure!(result.status == TestStatus::Pass, "status is PASS: {result:?}");

    let report = timings.report();
    ensure!(report.tests() == 1, "one test reported timings");
    ensure!(
        (report.percentage(EnginePhase::Parse) - 25.0).abs() < 1e-9,
        "parse is a quarter of the total"
    );
    Ok(())
}
