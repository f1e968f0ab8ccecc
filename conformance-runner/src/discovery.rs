// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Finding the test files to run.
//!
//! Discovery walks a directory tree, drops fixture files (files that are included by tests rather
//! than being tests themselves), and splits what remains into tests to run and tests to skip.

use crate::{errors::DiscoveryError, status::TestStatus};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Paths containing this marker are support files, not tests.
pub const FIXTURE_MARKER: &str = "_FIXTURE";

/// The subtrees skipped by default.
pub const DEFAULT_SKIP_PREFIXES: &[&str] = &["intl402", "staging"];

/// Which tests to skip instead of running.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SkipPolicy {
    enabled: bool,
    prefixes: Vec<String>,
}

impl SkipPolicy {
    /// Creates a policy that skips tests under any of the given prefixes.
    pub fn new(prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            enabled: true,
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a policy that runs everything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            prefixes: Vec::new(),
        }
    }

    /// Returns true if skipping is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the skip prefixes.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Returns true if a path relative to the test root should be skipped.
    pub fn skips_relative(&self, relative: &Utf8Path) -> bool {
        self.enabled
            && self
                .prefixes
                .iter()
                .any(|prefix| relative.as_str().starts_with(prefix.as_str()))
    }

    /// Returns true if a path with an unknown root should be skipped.
    ///
    /// Used for explicitly requested paths, where the root isn't known: a path is skipped if any
    /// of its components starts a skipped subtree.
    pub fn skips_anywhere(&self, path: &Utf8Path) -> bool {
        self.enabled
            && self.prefixes.iter().any(|prefix| {
                path.as_str().starts_with(prefix.as_str())
                    || path.as_str().contains(&format!("/{prefix}/"))
            })
    }
}

impl Default for SkipPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SKIP_PREFIXES.iter().copied())
    }
}

/// The outcome of discovery.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DiscoveredTests {
    /// Tests to run, sorted.
    pub to_run: Vec<Utf8PathBuf>,

    /// Tests excluded by skip policy, sorted. These are recorded as skipped without running.
    pub skipped: Vec<Utf8PathBuf>,

    /// Requested paths that don't exist.
    pub errors: Vec<Utf8PathBuf>,
}

impl DiscoveredTests {
    /// Returns the number of results a run over these tests will produce.
    pub fn total(&self) -> usize {
        self.to_run.len() + self.skipped.len()
    }

    fn sort(&mut self) {
        self.to_run.sort_unstable();
        self.to_run.dedup();
        self.skipped.sort_unstable();
        self.skipped.dedup();
        // A test requested explicitly is run even if a walk also found it under a skipped prefix.
        self.skipped.retain(|path| self.to_run.binary_search(path).is_err());
    }
}

/// Discovers every test under `root`.
///
/// Fails only if `root` itself can't be read. Unreadable entries below the root are logged and
/// ignored.
pub fn discover_dir(
    root: &Utf8Path,
    policy: &SkipPolicy,
) -> Result<DiscoveredTests, DiscoveryError> {
    std::fs::read_dir(root).map_err(|error| DiscoveryError::new(root, error))?;

    let mut tests = DiscoveredTests::default();
    for path in walk_files(root) {
        let relative = path.strip_prefix(root).unwrap_or(&path);
        if policy.skips_relative(relative) {
            tests.skipped.push(path);
        } else {
            tests.to_run.push(path);
        }
    }

    tests.sort();
    debug!(
        "discovered {} tests under {root} ({} skipped)",
        tests.to_run.len(),
        tests.skipped.len()
    );
    Ok(tests)
}

/// Discovers tests from an explicit list of files and directories, for scoped reruns.
///
/// Requested paths are resolved against `root`, so they produce the same paths as
/// [`discover_dir`] over `root` does. Directories are walked and checked against the skip
/// policy; files named explicitly are always run. Paths that don't exist are returned in
/// [`errors`](DiscoveredTests::errors) instead of failing the whole discovery. If `failed_only`
/// is set, tests that passed in it are dropped.
pub fn discover_paths(
    root: &Utf8Path,
    paths: &[Utf8PathBuf],
    policy: &SkipPolicy,
    failed_only: Option<&HashMap<Utf8PathBuf, TestStatus>>,
) -> DiscoveredTests {
    let canonical_root = root.canonicalize_utf8().ok();
    let passed = |path: &Utf8Path| {
        failed_only.is_some_and(|baseline| baseline.get(path) == Some(&TestStatus::Pass))
    };

    let mut tests = DiscoveredTests::default();
    for requested in paths {
        let Some(path) = resolve_under_root(root, canonical_root.as_deref(), requested) else {
            warn!("test path {requested} does not exist");
            tests.errors.push(requested.clone());
            continue;
        };

        if path.is_dir() {
            for file in walk_files(&path) {
                let skipped = match file.strip_prefix(root) {
                    Ok(relative) => policy.skips_relative(relative),
                    Err(_) => policy.skips_anywhere(&file),
                };
                if skipped {
                    tests.skipped.push(file);
                } else if !passed(&file) {
                    tests.to_run.push(file);
                }
            }
        } else if !path.as_str().contains(FIXTURE_MARKER) && !passed(&path) {
            tests.to_run.push(path);
        }
    }

    tests.sort();
    tests
}

/// Maps a requested path onto `root`, the way [`discover_dir`] names tests.
///
/// A path that exists and lies under the root (absolute, or relative to the current directory) is
/// rewritten as `root` joined with its root-relative part. A path that doesn't exist as given is
/// tried relative to the root. Paths outside the root are kept as given. Returns `None` if the
/// path doesn't exist either way.
fn resolve_under_root(
    root: &Utf8Path,
    canonical_root: Option<&Utf8Path>,
    path: &Utf8Path,
) -> Option<Utf8PathBuf> {
    if let Ok(canonical) = path.canonicalize_utf8() {
        let relative = canonical_root
            .and_then(|canonical_root| canonical.strip_prefix(canonical_root).ok());
        return Some(match relative {
            Some(relative) if relative.as_str().is_empty() => root.to_owned(),
            Some(relative) => root.join(relative),
            None => path.to_owned(),
        });
    }

    let under_root = root.join(path);
    (path.is_relative() && under_root.exists()).then_some(under_root)
}

/// Walks `dir`, yielding test files and skipping fixtures.
fn walk_files(dir: &Utf8Path) -> impl Iterator<Item = Utf8PathBuf> {
    WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                warn!("skipping unreadable entry during discovery: {error}");
                None
            }
        })
        .filter(|entry| !entry.file_type().is_dir())
        .filter_map(|entry| match Utf8PathBuf::from_path_buf(entry.into_path()) {
            Ok(path) => Some(path),
            Err(path) => {
                warn!("skipping non-UTF-8 path {}", path.display());
                None
            }
        })
        .filter(|path| !path.as_str().contains(FIXTURE_MARKER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use maplit::hashmap;
    use pretty_assertions::assert_eq;

    fn make_tree(files: &[&str]) -> Utf8TempDir {
        let dir = Utf8TempDir::new().unwrap();
        for file in files {
            let path = dir.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, "// test\n").unwrap();
        }
        dir
    }

    fn relative(root: &Utf8Path, paths: &[Utf8PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|path| path.strip_prefix(root).unwrap().to_string())
            .collect()
    }

    #[test]
    fn discover_with_skip_policy() {
        let dir = make_tree(&[
            "built-ins/Array/a.js",
            "built-ins/Array/b_FIXTURE.js",
            "language/c.js",
            "intl402/d.js",
            "staging/e.js",
            "harness/_FIXTURE/f.js",
        ]);

        let tests = discover_dir(dir.path(), &SkipPolicy::default()).unwrap();
        assert_eq!(
            relative(dir.path(), &tests.to_run),
            ["built-ins/Array/a.js", "language/c.js"]
        );
        assert_eq!(
            relative(dir.path(), &tests.skipped),
            ["intl402/d.js", "staging/e.js"]
        );
        assert_eq!(tests.total(), 4);

        let everything = discover_dir(dir.path(), &SkipPolicy::disabled()).unwrap();
        assert_eq!(everything.to_run.len(), 4);
        assert!(everything.skipped.is_empty());
    }

    #[test]
    fn discover_missing_root() {
        let dir = Utf8TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let error = discover_dir(&missing, &SkipPolicy::default()).unwrap_err();
        assert_eq!(error.root(), &missing);
    }

    #[test]
    fn discover_explicit_paths() {
        let dir = make_tree(&[
            "built-ins/Array/a.js",
            "built-ins/Array/b.js",
            "language/c.js",
            "language/d.js",
            "intl402/e.js",
            "intl402/f.js",
        ]);
        let root = dir.path();
        let missing = root.join("language/missing.js");

        let tests = discover_paths(
            root,
            &[
                root.join("built-ins"),
                root.join("language/c.js"),
                missing.clone(),
                root.join("intl402"),
                root.join("intl402/f.js"),
            ],
            &SkipPolicy::default(),
            None,
        );
        // Named files run even under a skipped subtree.
        assert_eq!(
            relative(root, &tests.to_run),
            [
                "built-ins/Array/a.js",
                "built-ins/Array/b.js",
                "intl402/f.js",
                "language/c.js"
            ]
        );
        assert_eq!(relative(root, &tests.skipped), ["intl402/e.js"]);
        assert_eq!(tests.errors, [missing]);
    }

    #[test]
    fn requested_paths_match_discovered_paths() {
        let dir = make_tree(&["built-ins/a.js", "language/b.js"]);
        let root = dir.path();
        let full = discover_dir(root, &SkipPolicy::default()).unwrap();

        let canonical = root.canonicalize_utf8().unwrap();
        let tests = discover_paths(
            root,
            &[
                canonical.join("language/../built-ins/a.js"),
                "language".into(),
                canonical.clone(),
            ],
            &SkipPolicy::default(),
            None,
        );
        assert_eq!(tests.to_run, full.to_run);
        assert!(tests.errors.is_empty());

        let elsewhere = make_tree(&["c.js"]);
        let outside = elsewhere.path().join("c.js");
        let tests = discover_paths(root, &[outside.clone()], &SkipPolicy::default(), None);
        assert_eq!(tests.to_run, [outside]);
    }

    #[test]
    fn discover_failed_only() {
        let dir = make_tree(&["a.js", "b.js", "c.js", "intl402/d.js"]);
        let root = dir.path();
        let baseline = hashmap! {
            root.join("a.js") => TestStatus::Pass,
            root.join("b.js") => TestStatus::Fail,
            root.join("intl402/d.js") => TestStatus::Pass,
        };

        let tests = discover_paths(
            root,
            &[root.to_owned()],
            &SkipPolicy::default(),
            Some(&baseline),
        );
        // c.js has no baseline and is run as well.
        assert_eq!(relative(root, &tests.to_run), ["b.js", "c.js"]);
        assert_eq!(relative(root, &tests.skipped), ["intl402/d.js"]);

        let canonical = root.canonicalize_utf8().unwrap();
        let tests = discover_paths(
            root,
            &[canonical.join("a.js"), canonical.join("b.js")],
            &SkipPolicy::default(),
            Some(&baseline),
        );
        assert_eq!(tests.to_run, [root.join("b.js")]);
    }
}
