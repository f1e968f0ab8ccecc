// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{fs::File, io::PipeReader, os::windows::io::OwnedHandle};

pub(super) fn pipe_reader_to_file(rx: PipeReader) -> File {
    File::from(OwnedHandle::from(rx))
}

// Process groups are a Unix concept.
pub(super) fn set_process_group(_cmd: &mut std::process::Command) {}

pub(super) fn kill_child(child: &mut tokio::process::Child) {
    // Errors mean the child already exited.
    _ = child.start_kill();
}
