// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resident memory sampling for engine processes.
//!
//! Only Linux exposes a cheap per-process RSS reading. Elsewhere samples are always `None` and
//! results report 0 KiB.

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        /// Reads the current resident set size of `pid` in KiB.
        ///
        /// Returns `None` if the process has exited or its status can't be read.
        pub(crate) async fn sample_rss_kb(pid: u32) -> Option<u64> {
            let status = tokio::fs::read_to_string(format!("/proc/{pid}/status"))
                .await
                .ok()?;
            parse_vm_rss(&status)
        }
    } else {
        pub(crate) async fn sample_rss_kb(_pid: u32) -> Option<u64> {
            None
        }
    }
}

/// Extracts the `VmRSS` value from the contents of `/proc/<pid>/status`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    // The line looks like "VmRSS:\t    1234 kB".
    line.split_whitespace().nth(1)?.parse().ok()
}
