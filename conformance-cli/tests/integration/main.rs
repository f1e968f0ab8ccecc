// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the `conformance` binary.
//!
//! The engine is a shell script that prints the test file, so each test's contents are its
//! verdict.

#![cfg(unix)]

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::{Result, ensure};
use conformance_runner::{
    status::TestStatus,
    store::{ResultStore, read_compact},
};
use indoc::indoc;
use itertools::Itertools;
use pretty_assertions::assert_eq;
use std::{os::unix::fs::PermissionsExt, process::Output};

struct Workspace {
    dir: Utf8TempDir,
}

impl Workspace {
    fn new() -> Self {
        let workspace = Self {
            dir: Utf8TempDir::new().expect("created temp dir"),
        };
        let engine = workspace.path("engine.sh");
        std::fs::write(&engine, "#!/bin/sh\ncat \"$1\"\n").expect("wrote engine");
        std::fs::set_permissions(&engine, std::fs::Permissions::from_mode(0o755))
            .expect("made engine executable");

        workspace.write(
            ".config/conformance.toml",
            indoc! {r#"
                [profile.default]
                engine = "./engine.sh"
                test-root = "suite"
                results-path = "out/results.json"
                workers = 2
                timeout = "10s"
            "#},
        );
        workspace
    }

    fn path(&self, relative: &str) -> Utf8PathBuf {
        self.dir.path().join(relative)
    }

    fn write(&self, relative: &str, contents: &str) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("created parent dir");
        }
        std::fs::write(path, contents).expect("wrote file");
    }

    fn conformance(&self, args: &[&str]) -> Output {
        std::process::Command::new(env!("CARGO_BIN_EXE_conformance"))
            .args(["--color", "never"])
            .args(args)
            .current_dir(self.dir.path())
            .env_remove("CONFORMANCE_PROFILE")
            .env_remove("CONFORMANCE_ENGINE")
            .output()
            .expect("ran conformance")
    }

    /// Returns the statuses in a result file by root-relative path, sorted.
    fn statuses(&self, results: &Utf8Path) -> Vec<(String, TestStatus)> {
        let results = ResultStore::new(results)
            .load()
            .expect("results are readable")
            .expect("results exist");
        results
            .results()
            .iter()
            .map(|result| {
                let path = result
                    .path
                    .strip_prefix("suite")
                    .unwrap_or(&result.path)
                    .to_string();
                (path, result.status)
            })
            .sorted()
            .collect()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn full_run_then_scoped_rerun() -> Result<()> {
    let workspace = Workspace::new();
    workspace.write("suite/a.js", "PASS\n");
    workspace.write("suite/b.js", "FAIL: expected 1\n");
    workspace.write("suite/intl402/c.js", "PASS\n");

    let output = workspace.conformance(&["run"]);
    ensure!(output.status.success(), "run failed: {output:?}");
    let text = stdout(&output);
    ensure!(text.contains("Ran 3 tests"), "summary printed: {text}");

    let results = workspace.path("out/results.json");
    assert_eq!(
        workspace.statuses(&results),
        [
            ("a.js".to_owned(), TestStatus::Pass),
            ("b.js".to_owned(), TestStatus::Fail),
            ("intl402/c.js".to_owned(), TestStatus::Skip),
        ]
    );

    // Fix b.js and rerun only what didn't pass.
    workspace.write("suite/b.js", "PASS\n");
    let output = workspace.conformance(&["run", "--failed-only", "--no-skip"]);
    ensure!(output.status.success(), "rerun failed: {output:?}");
    let text = stdout(&output);
    ensure!(text.contains("FAIL->PASS (1)"), "diff printed: {text}");
    ensure!(text.contains("SKIP->PASS (1)"), "diff printed: {text}");

    assert_eq!(
        workspace.statuses(&results),
        [
            ("a.js".to_owned(), TestStatus::Pass),
            ("b.js".to_owned(), TestStatus::Pass),
            ("intl402/c.js".to_owned(), TestStatus::Pass),
        ]
    );
    Ok(())
}

#[test]
fn scoped_paths_resolve_to_test_root() -> Result<()> {
    let workspace = Workspace::new();
    workspace.write("suite/a.js", "PASS\n");
    workspace.write("suite/b.js", "FAIL: expected 1\n");

    let output = workspace.conformance(&["run"]);
    ensure!(output.status.success(), "run failed: {output:?}");
    let results = workspace.path("out/results.json");

    // a.js breaks but passed last time, so --failed-only leaves it alone.
    workspace.write("suite/a.js", "FAIL: broken\n");
    workspace.write("suite/b.js", "PASS\n");
    let suite = workspace.path("suite");
    let output = workspace.conformance(&["run", "--failed-only", suite.as_str()]);
    ensure!(output.status.success(), "rerun failed: {output:?}");
    let text = stdout(&output);
    ensure!(text.contains("Ran 1 tests"), "only b.js reran: {text}");
    assert_eq!(
        workspace.statuses(&results),
        [
            ("a.js".to_owned(), TestStatus::Pass),
            ("b.js".to_owned(), TestStatus::Pass),
        ]
    );

    // Root-relative and absolute file paths name the same tests as the full run did.
    let b = workspace.path("suite/b.js");
    let output = workspace.conformance(&["run", "a.js", b.as_str()]);
    ensure!(output.status.success(), "rerun failed: {output:?}");
    assert_eq!(
        workspace.statuses(&results),
        [
            ("a.js".to_owned(), TestStatus::Fail),
            ("b.js".to_owned(), TestStatus::Pass),
        ]
    );
    Ok(())
}

#[test]
fn scoped_run_leaves_unreadable_baseline_alone() -> Result<()> {
    let workspace = Workspace::new();
    workspace.write("suite/a.js", "PASS\n");
    workspace.write("suite/b.js", "PASS\n");
    workspace.write("suite/c.js", "PASS\n");

    let output = workspace.conformance(&["run"]);
    ensure!(output.status.success(), "run failed: {output:?}");

    let results = workspace.path("out/results.json");
    let mut contents = std::fs::read(&results)?;
    contents.pop();
    std::fs::write(&results, &contents)?;

    let output = workspace.conformance(&["run", "suite/b.js"]);
    assert_eq!(output.status.code(), Some(103), "scoped run refuses: {output:?}");
    assert_eq!(std::fs::read(&results)?, contents, "baseline is untouched");

    // A full run replaces the unreadable file.
    let output = workspace.conformance(&["run"]);
    ensure!(output.status.success(), "run failed: {output:?}");
    assert_eq!(workspace.statuses(&results).len(), 3);
    Ok(())
}

#[test]
fn diff_merge_and_compact() -> Result<()> {
    let workspace = Workspace::new();
    workspace.write("suite/a.js", "PASS\n");
    workspace.write("suite/b.js", "PASS\n");

    let output = workspace.conformance(&["run"]);
    ensure!(output.status.success(), "run failed: {output:?}");
    std::fs::copy(workspace.path("out/results.json"), workspace.path("old.json"))?;

    workspace.write("suite/b.js", "this is not a verdict\n");
    let output = workspace.conformance(&[
        "run",
        "suite/b.js",
        "--results",
        "partial.json",
        "--no-diff",
    ]);
    ensure!(output.status.success(), "scoped run failed: {output:?}");

    let output = workspace.conformance(&["merge", "partial.json", "old.json", "-o", "new.json"]);
    ensure!(output.status.success(), "merge failed: {output:?}");
    let output = workspace.conformance(&["diff", "old.json", "new.json"]);
    ensure!(output.status.success(), "diff failed: {output:?}");
    assert_eq!(stdout(&output), "PASS->CRASH (1)\n  suite/b.js\n");

    let output = workspace.conformance(&["diff", "old.json", "new.json", "--filter", "PASS->FAIL"]);
    assert_eq!(stdout(&output), "no status changes\n");

    let output = workspace.conformance(&[
        "compact", "new.json", "--root", "suite", "--output", "compact.json",
    ]);
    ensure!(output.status.success(), "compact failed: {output:?}");
    let compact = read_compact(&workspace.path("compact.json"))?;
    let mut entries: Vec<_> = compact
        .results()
        .iter()
        .map(|result| (result.path.to_string(), result.status))
        .collect();
    entries.sort();
    assert_eq!(
        entries,
        [
            ("a.js".to_owned(), TestStatus::Pass),
            ("b.js".to_owned(), TestStatus::Crash),
        ]
    );
    Ok(())
}

#[test]
fn setup_errors_have_exit_codes() {
    let workspace = Workspace::new();

    let output = workspace.conformance(&["--profile", "nightly", "run"]);
    assert_eq!(output.status.code(), Some(96), "unknown profile is a setup error");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("profile `nightly` not found"),
        "error is reported: {stderr}"
    );

    let output = workspace.conformance(&["diff", "old.json", "new.json"]);
    assert_eq!(output.status.code(), Some(103), "missing results are a store error");

    let output = workspace.conformance(&["run", "--diff-filter", "PASS=>FAIL"]);
    assert_eq!(output.status.code(), Some(94), "bad filter is an invalid argument");
}
