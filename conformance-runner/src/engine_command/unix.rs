// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{fs::File, io::PipeReader, os::fd::OwnedFd, os::unix::process::CommandExt};

pub(super) fn pipe_reader_to_file(rx: PipeReader) -> File {
    File::from(OwnedFd::from(rx))
}

/// Puts the engine in its own process group, so a kill reaches anything it spawned.
pub(super) fn set_process_group(cmd: &mut std::process::Command) {
    cmd.process_group(0);
}

/// Sends SIGKILL to the child's process group.
pub(super) fn kill_child(child: &mut tokio::process::Child) {
    // child.id() is None once the child has been reaped, so a recycled PID is never signaled.
    if let Some(pid) = child.id() {
        // A negative PID addresses the whole process group.
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
        }
    }
}
