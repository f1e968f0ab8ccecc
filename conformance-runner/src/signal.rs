// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turning OS shutdown signals into run cancellation.

use crate::errors::SignalHandlerSetupError;
use std::fmt;

/// Which signals a [`TestRunner`](crate::runner::TestRunner) listens to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SignalHandlerKind {
    /// Interrupt, hangup and terminate on Unix, Ctrl-C on Windows.
    Standard,

    /// No signals. Useful for tests, which run many runners in one process.
    Noop,
}

impl SignalHandlerKind {
    pub(crate) fn build(self) -> Result<SignalHandler, SignalHandlerSetupError> {
        match self {
            Self::Standard => Ok(SignalHandler {
                signals: Some(imp::Signals::new()?),
            }),
            Self::Noop => Ok(SignalHandler { signals: None }),
        }
    }
}

/// A signal that requests the run to stop.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ShutdownSignal {
    /// SIGINT or Ctrl-C.
    Interrupt,
    /// SIGHUP.
    #[cfg(unix)]
    Hangup,
    /// SIGTERM.
    #[cfg(unix)]
    Term,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => write!(f, "interrupt"),
            #[cfg(unix)]
            Self::Hangup => write!(f, "hangup"),
            #[cfg(unix)]
            Self::Term => write!(f, "terminate"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct SignalHandler {
    signals: Option<imp::Signals>,
}

impl SignalHandler {
    /// Waits for the next shutdown signal.
    ///
    /// Returns `None` once no more signals can arrive; for the no-op handler that is
    /// immediately.
    pub(crate) async fn recv(&mut self) -> Option<ShutdownSignal> {
        match &mut self.signals {
            Some(signals) => signals.recv().await,
            None => None,
        }
    }
}

#[cfg(unix)]
mod imp {
    use super::ShutdownSignal;
    use tokio::signal::unix::{Signal, SignalKind, signal};

    #[derive(Debug)]
    pub(super) struct Signals {
        sigint: Listener,
        sighup: Listener,
        sigterm: Listener,
    }

    impl Signals {
        pub(super) fn new() -> std::io::Result<Self> {
            Ok(Self {
                sigint: Listener::new(SignalKind::interrupt())?,
                sighup: Listener::new(SignalKind::hangup())?,
                sigterm: Listener::new(SignalKind::terminate())?,
            })
        }

        pub(super) async fn recv(&mut self) -> Option<ShutdownSignal> {
            loop {
                tokio::select! {
                    recv = self.sigint.signal.recv(), if !self.sigint.done => match recv {
                        Some(()) => break Some(ShutdownSignal::Interrupt),
                        None => self.sigint.done = true,
                    },
                    recv = self.sighup.signal.recv(), if !self.sighup.done => match recv {
                        Some(()) => break Some(ShutdownSignal::Hangup),
                        None => self.sighup.done = true,
                    },
                    recv = self.sigterm.signal.recv(), if !self.sigterm.done => match recv {
                        Some(()) => break Some(ShutdownSignal::Term),
                        None => self.sigterm.done = true,
                    },
                    else => break None,
                }
            }
        }
    }

    /// A signal stream plus whether it has been closed.
    #[derive(Debug)]
    struct Listener {
        signal: Signal,
        done: bool,
    }

    impl Listener {
        fn new(kind: SignalKind) -> std::io::Result<Self> {
            Ok(Self {
                signal: signal(kind)?,
                done: false,
            })
        }
    }
}

#[cfg(windows)]
mod imp {
    use super::ShutdownSignal;
    use tokio::signal::windows::{CtrlC, ctrl_c};

    #[derive(Debug)]
    pub(super) struct Signals {
        ctrl_c: CtrlC,
        done: bool,
    }

    impl Signals {
        pub(super) fn new() -> std::io::Result<Self> {
            Ok(Self {
                ctrl_c: ctrl_c()?,
                done: false,
            })
        }

        pub(super) async fn recv(&mut self) -> Option<ShutdownSignal> {
            if self.done {
                return None;
            }
            match self.ctrl_c.recv().await {
                Some(()) => Some(ShutdownSignal::Interrupt),
                None => {
                    self.done = true;
                    None
                }
            }
        }
    }
}
