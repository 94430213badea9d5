//! Process lifecycle control.
//!
//! A [`Platform`] owns the clock and the child processes. Children are
//! created suspended, run only between `resume` and `suspend`, and are
//! reaped exactly once. The Unix backend drives real processes with
//! `SIGSTOP`/`SIGCONT`; [`crate::sim::SimPlatform`] is a deterministic
//! stand-in with a virtual clock.

pub mod unix;

pub use unix::UnixPlatform;

use nix::errno::Errno;
use std::{error::Error, fmt, time::Duration};

use crate::command::CommandError;
use crate::core::state::Millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessHandle(i32);

impl ProcessHandle {
    pub fn from_raw(pid: i32) -> Self {
        Self(pid)
    }

    pub fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {}", self.0)
    }
}

/// How a reaped child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Exited(i32),
    Signaled(i32),
}

impl Outcome {
    pub fn finished(self) -> bool {
        matches!(self, Outcome::Exited(_))
    }

    pub fn error(self) -> bool {
        !matches!(self, Outcome::Exited(0))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Exited(code) => write!(f, "exited with status {code}"),
            Outcome::Signaled(signal) => write!(f, "killed by signal {signal}"),
        }
    }
}

#[derive(Debug)]
pub enum PlatformError {
    Command(CommandError),
    Os {
        op: &'static str,
        handle: Option<ProcessHandle>,
        errno: Errno,
    },
    Unexpected {
        op: &'static str,
        handle: ProcessHandle,
        detail: String,
    },
}

impl PlatformError {
    pub fn os(op: &'static str, handle: impl Into<Option<ProcessHandle>>, errno: Errno) -> Self {
        Self::Os {
            op,
            handle: handle.into(),
            errno,
        }
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(err) => write!(f, "{err}"),
            Self::Os {
                op,
                handle: Some(handle),
                errno,
            } => write!(f, "{op} on {handle}: {errno}"),
            Self::Os {
                op,
                handle: None,
                errno,
            } => write!(f, "{op}: {errno}"),
            Self::Unexpected { op, handle, detail } => {
                write!(f, "{op} on {handle}: unexpected {detail}")
            }
        }
    }
}

impl Error for PlatformError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Command(err) => Some(err),
            Self::Os { errno, .. } => Some(errno),
            Self::Unexpected { .. } => None,
        }
    }
}

impl From<CommandError> for PlatformError {
    fn from(err: CommandError) -> Self {
        Self::Command(err)
    }
}

pub trait Platform {
    /// Monotonic milliseconds since an arbitrary origin.
    fn now(&self) -> Millis;

    fn sleep(&mut self, duration: Duration);

    /// Start `command` as a child that is stopped before it executes
    /// anything. An unexecutable program is not an error here: the child
    /// exits with status 1 once resumed.
    fn spawn(&mut self, command: &str) -> Result<ProcessHandle, PlatformError>;

    fn resume(&mut self, handle: ProcessHandle) -> Result<(), PlatformError>;

    fn suspend(&mut self, handle: ProcessHandle) -> Result<(), PlatformError>;

    fn reap_blocking(&mut self, handle: ProcessHandle) -> Result<Outcome, PlatformError>;

    fn try_reap(&mut self, handle: ProcessHandle) -> Result<Option<Outcome>, PlatformError>;

    fn kill(&mut self, handle: ProcessHandle) -> Result<(), PlatformError>;

    /// Poll for exit every `poll` until `deadline`. The child is left as is
    /// when the deadline passes first.
    fn wait_until(
        &mut self,
        handle: ProcessHandle,
        deadline: Millis,
        poll: Duration,
    ) -> Result<Option<Outcome>, PlatformError> {
        loop {
            if let Some(outcome) = self.try_reap(handle)? {
                return Ok(Some(outcome));
            }
            if self.now() >= deadline {
                return Ok(None);
            }
            self.sleep(poll);
        }
    }
}
