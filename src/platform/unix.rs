use log::debug;
use nix::{
    errno::Errno,
    libc,
    sys::{
        signal::{Signal, kill, raise},
        wait::{WaitPidFlag, WaitStatus, waitpid},
    },
    unistd::{ForkResult, Pid, fork},
};
use std::{
    thread,
    time::{Duration, Instant},
};

use super::{Outcome, Platform, PlatformError, ProcessHandle};
use crate::command::CommandLine;
use crate::core::state::Millis;

/// Real child processes, controlled with job-control signals.
///
/// Only the child itself is signalled; grandchildren started by a job keep
/// running while it is suspended.
#[derive(Debug)]
pub struct UnixPlatform {
    origin: Instant,
}

impl Default for UnixPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl UnixPlatform {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    fn signal(
        &self,
        op: &'static str,
        handle: ProcessHandle,
        signal: Signal,
    ) -> Result<(), PlatformError> {
        kill(pid(handle), signal).map_err(|errno| PlatformError::os(op, handle, errno))
    }
}

fn pid(handle: ProcessHandle) -> Pid {
    Pid::from_raw(handle.as_raw())
}

fn outcome(
    op: &'static str,
    handle: ProcessHandle,
    status: WaitStatus,
) -> Result<Option<Outcome>, PlatformError> {
    match status {
        WaitStatus::Exited(_, code) => Ok(Some(Outcome::Exited(code))),
        WaitStatus::Signaled(_, signal, _) => Ok(Some(Outcome::Signaled(signal as i32))),
        WaitStatus::StillAlive => Ok(None),
        other => Err(PlatformError::Unexpected {
            op,
            handle,
            detail: format!("{other:?}"),
        }),
    }
}

impl Platform for UnixPlatform {
    fn now(&self) -> Millis {
        self.origin.elapsed().as_millis() as Millis
    }

    fn sleep(&mut self, duration: Duration) {
        if duration.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(duration);
        }
    }

    fn spawn(&mut self, command: &str) -> Result<ProcessHandle, PlatformError> {
        // The child must not allocate, so argv is fully built here.
        let line = CommandLine::parse(command)?;
        let argv = line.exec_argv();

        // SAFETY: the child only calls async-signal-safe functions before
        // exec or _exit.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                let _ = raise(Signal::SIGSTOP);
                // SAFETY: `argv` is NULL-terminated and points into `line`,
                // both alive until exec replaces the image.
                unsafe { libc::execvp(line.program().as_ptr(), argv.as_ptr()) };
                // SAFETY: exec failed; leave without running parent cleanup.
                unsafe { libc::_exit(libc::EXIT_FAILURE) }
            }
            Ok(ForkResult::Parent { child }) => {
                let handle = ProcessHandle::from_raw(child.as_raw());
                // Do not hand the child out until it is known to be stopped.
                loop {
                    match waitpid(child, Some(WaitPidFlag::WUNTRACED)) {
                        Ok(WaitStatus::Stopped(_, _)) => break,
                        Err(Errno::EINTR) => continue,
                        Ok(status) => {
                            return Err(PlatformError::Unexpected {
                                op: "spawn",
                                handle,
                                detail: format!("{status:?}"),
                            });
                        }
                        Err(errno) => return Err(PlatformError::os("waitpid", handle, errno)),
                    }
                }
                debug!("spawned {handle} for {command:?}");
                Ok(handle)
            }
            Err(errno) => Err(PlatformError::os("fork", None, errno)),
        }
    }

    fn resume(&mut self, handle: ProcessHandle) -> Result<(), PlatformError> {
        self.signal("resume", handle, Signal::SIGCONT)
    }

    fn suspend(&mut self, handle: ProcessHandle) -> Result<(), PlatformError> {
        self.signal("suspend", handle, Signal::SIGSTOP)
    }

    fn reap_blocking(&mut self, handle: ProcessHandle) -> Result<Outcome, PlatformError> {
        loop {
            match waitpid(pid(handle), None) {
                Ok(status) => {
                    if let Some(done) = outcome("reap", handle, status)? {
                        return Ok(done);
                    }
                }
                // An interrupt must not lose the child.
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(PlatformError::os("reap", handle, errno)),
            }
        }
    }

    fn try_reap(&mut self, handle: ProcessHandle) -> Result<Option<Outcome>, PlatformError> {
        match waitpid(pid(handle), Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => outcome("try_reap", handle, status),
            Err(Errno::EINTR) => Ok(None),
            Err(errno) => Err(PlatformError::os("try_reap", handle, errno)),
        }
    }

    fn kill(&mut self, handle: ProcessHandle) -> Result<(), PlatformError> {
        self.signal("kill", handle, Signal::SIGKILL)
    }
}
