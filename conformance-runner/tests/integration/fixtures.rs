// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use std::sync::Once;

/// The stand-in engine built from `test-helpers/fake-engine.rs`.
pub(crate) fn fake_engine() -> &'static Utf8Path {
    Utf8Path::new(env!("CARGO_BIN_EXE_fake-engine"))
}

pub(crate) fn test_init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        color_eyre::install().unwrap();
    });
}

/// A temporary test corpus. Test files contain fake-engine instructions.
pub(crate) struct Corpus {
    dir: Utf8TempDir,
}

impl Corpus {
    pub(crate) fn new() -> Self {
        Self {
            dir: Utf8TempDir::new().unwrap(),
        }
    }

    pub(crate) fn root(&self) -> &Utf8Path {
        self.dir.path()
    }

    /// Writes a test file and returns its absolute path.
    pub(crate) fn add(&self, relative: &str, contents: &str) -> Utf8PathBuf {
        let path = self.dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Returns a path inside the corpus directory that tests can write to.
    pub(crate) fn scratch(&self, name: &str) -> Utf8PathBuf {
        self.dir.path().join(name)
    }
}

/// Returns true if a process with this pid still exists.
#[cfg(unix)]
pub(crate) fn process_exists(pid: u32) -> bool {
    // Signal 0 only checks for existence.
    let res = unsafe { libc::kill(pid as libc::pid_t, 0) };
    res == 0 || std::io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}
