// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Spawning an engine process with its stdout and stderr joined onto one pipe.

use bytes::BytesMut;
use camino::Utf8Path;
use std::{io, process::Stdio};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Child as TokioChild,
};

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        #[path = "unix.rs"]
        mod unix;
        use unix as os;
    } else if #[cfg(windows)] {
        #[path = "windows.rs"]
        mod windows;
        use windows as os;
    } else {
        compile_error!("unsupported target platform");
    }
}

/// The command line `<engine> <test path>`.
#[derive(Debug)]
pub(crate) struct EngineCommand {
    command: std::process::Command,
}

impl EngineCommand {
    pub(crate) fn new(engine: &Utf8Path, test_path: &Utf8Path) -> Self {
        let mut command = std::process::Command::new(engine);
        command.arg(test_path);
        os::set_process_group(&mut command);
        Self { command }
    }

    /// Spawns the engine with stdin closed and output captured into a single stream.
    pub(crate) fn spawn(self) -> io::Result<Child> {
        let mut command = self.command;
        command.stdin(Stdio::null());

        let (reader, writer) = io::pipe()?;
        command.stdout(writer.try_clone()?);
        command.stderr(writer);

        let child = {
            let mut command: tokio::process::Command = command.into();
            command.kill_on_drop(true);
            // The command owns the write ends of the pipe. It must be dropped right after the
            // spawn, or reads would never see EOF.
            command.spawn()?
        };

        let combined = File::from_std(os::pipe_reader_to_file(reader));
        Ok(Child {
            child,
            output: OutputAccumulator::new(combined),
        })
    }
}

/// A spawned engine process along with its output.
pub(crate) struct Child {
    pub(crate) child: TokioChild,
    pub(crate) output: OutputAccumulator,
}

impl Child {
    pub(crate) fn kill(&mut self) {
        os::kill_child(&mut self.child);
    }
}

/// The size of the buffered reader's buffer.
///
/// This is the normal page size on most systems.
const CHUNK_SIZE: usize = 4 * 1024;

/// A `BufReader` over an `AsyncRead` that tracks whether it has hit EOF or an error.
pub(crate) struct FusedBufReader<R> {
    reader: BufReader<R>,
    done: bool,
}

impl<R: AsyncRead + Unpin> FusedBufReader<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(CHUNK_SIZE, reader),
            done: false,
        }
    }

    pub(crate) async fn fill_buf(&mut self, acc: &mut BytesMut) -> Result<(), io::Error> {
        if self.done {
            return Ok(());
        }

        match self.reader.fill_buf().await {
            Ok(buf) => {
                acc.extend_from_slice(buf);
                if buf.is_empty() {
                    self.done = true;
                }
                let len = buf.len();
                self.reader.consume(len);
                Ok(())
            }
            Err(error) => {
                self.done = true;
                Err(error)
            }
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }
}

/// Accumulates the combined output of an engine process.
pub(crate) struct OutputAccumulator {
    reader: FusedBufReader<File>,
    buf: BytesMut,
    error: Option<io::Error>,
}

impl OutputAccumulator {
    fn new(file: File) -> Self {
        Self {
            reader: FusedBufReader::new(file),
            buf: BytesMut::with_capacity(CHUNK_SIZE),
            error: None,
        }
    }

    /// Reads the next chunk of output. Cancel safe.
    pub(crate) async fn fill_buf(&mut self) {
        if let Err(error) = self.reader.fill_buf(&mut self.buf).await {
            self.error = Some(error);
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.reader.is_done()
    }

    pub(crate) fn error(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }

    /// Returns everything read so far, with invalid UTF-8 replaced.
    pub(crate) fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}
