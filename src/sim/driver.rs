use log::debug;
use nix::errno::Errno;
use rustc_hash::{FxHashMap, FxHashSet};
use std::time::Duration;

use super::job::{SimProcess, SimProgram, SimState};
use crate::command::CommandLine;
use crate::core::state::Millis;
use crate::platform::{Outcome, Platform, PlatformError, ProcessHandle};

const FIRST_PID: i32 = 1000;

/// Deterministic platform with a virtual millisecond clock.
///
/// Time only moves when the scheduler sleeps or blocks. Every resumed
/// process is credited with the elapsed time, so a process finishing in the
/// middle of a sleep is seen as exited when the sleep returns. Sleeps
/// shorter than one tick still advance the clock by one tick.
#[derive(Debug, Default)]
pub struct SimPlatform {
    now: Millis,
    processes: Vec<SimProcess>,
    programs: FxHashMap<String, SimProgram>,
    unspawnable: FxHashSet<String>,
}

impl SimPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `command` a fixed behavior instead of the built-in one.
    pub fn define(&mut self, command: &str, program: SimProgram) -> &mut Self {
        self.programs.insert(command.to_owned(), program);
        self
    }

    /// Make every spawn of `command` fail as if fork were refused.
    pub fn fail_spawn(&mut self, command: &str) -> &mut Self {
        self.unspawnable.insert(command.to_owned());
        self
    }

    pub fn process(&self, handle: ProcessHandle) -> Option<&SimProcess> {
        self.index(handle).map(|i| &self.processes[i])
    }

    pub fn processes(&self) -> &[SimProcess] {
        &self.processes
    }

    pub fn running(&self) -> impl Iterator<Item = &SimProcess> {
        self.processes
            .iter()
            .filter(|process| process.state == SimState::Running)
    }

    fn index(&self, handle: ProcessHandle) -> Option<usize> {
        let index = usize::try_from(handle.as_raw() - FIRST_PID).ok()?;
        (index < self.processes.len()).then_some(index)
    }

    fn live(
        &mut self,
        op: &'static str,
        handle: ProcessHandle,
    ) -> Result<&mut SimProcess, PlatformError> {
        match self.index(handle) {
            Some(i) if self.processes[i].state != SimState::Reaped => Ok(&mut self.processes[i]),
            _ => Err(PlatformError::os(op, handle, Errno::ESRCH)),
        }
    }

    fn advance(&mut self, ticks: Millis) {
        let now = self.now;
        for process in self
            .processes
            .iter_mut()
            .filter(|process| process.state == SimState::Running)
        {
            let remaining = process.remaining();
            if remaining <= ticks {
                process.consumed = process.program.run_time;
                process.state = SimState::Exited;
                process.exited_at = Some(now + remaining);
            } else {
                process.consumed += ticks;
            }
        }
        self.now += ticks;
    }

    fn reap(&mut self, index: usize) -> Outcome {
        let process = &mut self.processes[index];
        process.state = SimState::Reaped;
        process.outcome()
    }
}

impl Platform for SimPlatform {
    fn now(&self) -> Millis {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.advance((duration.as_millis() as Millis).max(1));
    }

    fn spawn(&mut self, command: &str) -> Result<ProcessHandle, PlatformError> {
        CommandLine::parse(command)?;
        if self.unspawnable.contains(command) {
            return Err(PlatformError::os("fork", None, Errno::EAGAIN));
        }

        let program = self
            .programs
            .get(command)
            .copied()
            .unwrap_or_else(|| SimProgram::from_command(command));
        let handle = ProcessHandle::from_raw(FIRST_PID + self.processes.len() as i32);
        self.processes.push(SimProcess::new(command, program));
        debug!("sim spawned {handle} for {command:?}");
        Ok(handle)
    }

    fn resume(&mut self, handle: ProcessHandle) -> Result<(), PlatformError> {
        let now = self.now;
        let process = self.live("resume", handle)?;
        if process.state == SimState::Stopped {
            if process.remaining() == 0 {
                process.state = SimState::Exited;
                process.exited_at = Some(now);
            } else {
                process.state = SimState::Running;
            }
        }
        Ok(())
    }

    fn suspend(&mut self, handle: ProcessHandle) -> Result<(), PlatformError> {
        let process = self.live("suspend", handle)?;
        if process.state == SimState::Running {
            process.state = SimState::Stopped;
        }
        Ok(())
    }

    fn reap_blocking(&mut self, handle: ProcessHandle) -> Result<Outcome, PlatformError> {
        let state = self.live("reap", handle)?.state;
        let Some(index) = self.index(handle) else {
            return Err(PlatformError::os("reap", handle, Errno::ECHILD));
        };
        match state {
            SimState::Running => {
                let remaining = self.processes[index].remaining();
                self.advance(remaining);
                Ok(self.reap(index))
            }
            SimState::Exited => Ok(self.reap(index)),
            // Nothing would ever wake a stopped child.
            SimState::Stopped => Err(PlatformError::os("reap", handle, Errno::EDEADLK)),
            SimState::Reaped => Err(PlatformError::os("reap", handle, Errno::ECHILD)),
        }
    }

    fn try_reap(&mut self, handle: ProcessHandle) -> Result<Option<Outcome>, PlatformError> {
        let state = self.live("try_reap", handle)?.state;
        match (state, self.index(handle)) {
            (SimState::Exited, Some(index)) => Ok(Some(self.reap(index))),
            _ => Ok(None),
        }
    }

    fn kill(&mut self, handle: ProcessHandle) -> Result<(), PlatformError> {
        let now = self.now;
        let process = self.live("kill", handle)?;
        if process.state != SimState::Exited {
            process.killed = true;
            process.state = SimState::Exited;
            process.exited_at = Some(now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_children_do_not_progress() {
        let mut sim = SimPlatform::new();
        let handle = sim.spawn("sleep 0.05").unwrap();
        sim.sleep(Duration::from_millis(100));
        assert_eq!(sim.try_reap(handle).unwrap(), None);
        assert_eq!(sim.process(handle).unwrap().consumed, 0);

        sim.resume(handle).unwrap();
        sim.sleep(Duration::from_millis(30));
        sim.suspend(handle).unwrap();
        assert_eq!(sim.process(handle).unwrap().consumed, 30);
        assert_eq!(sim.try_reap(handle).unwrap(), None);

        sim.resume(handle).unwrap();
        assert_eq!(sim.reap_blocking(handle).unwrap(), Outcome::Exited(0));
        assert_eq!(sim.now(), 150);
    }

    #[test]
    fn exit_inside_a_sleep_is_seen_afterwards() {
        let mut sim = SimPlatform::new();
        let handle = sim.spawn("sleep 0.01").unwrap();
        sim.resume(handle).unwrap();
        sim.sleep(Duration::from_millis(25));
        let process = sim.process(handle).unwrap();
        assert_eq!(process.exited_at, Some(10));
        assert_eq!(sim.try_reap(handle).unwrap(), Some(Outcome::Exited(0)));
        // Reaping twice is an error, like ECHILD.
        assert!(sim.try_reap(handle).is_err());
    }

    #[test]
    fn blocking_reap_on_stopped_child_is_refused() {
        let mut sim = SimPlatform::new();
        let handle = sim.spawn("sleep 1").unwrap();
        assert!(matches!(
            sim.reap_blocking(handle),
            Err(PlatformError::Os {
                errno: Errno::EDEADLK,
                ..
            })
        ));
    }

    #[test]
    fn wait_until_races_deadline() {
        let mut sim = SimPlatform::new();
        sim.define("burn", SimProgram::exiting(25, 0));
        let handle = sim.spawn("burn").unwrap();
        sim.resume(handle).unwrap();

        let poll = Duration::from_millis(1);
        assert_eq!(sim.wait_until(handle, 10, poll).unwrap(), None);
        assert_eq!(sim.now(), 10);
        assert_eq!(
            sim.wait_until(handle, 40, poll).unwrap(),
            Some(Outcome::Exited(0))
        );
        assert_eq!(sim.now(), 25);
    }

    #[test]
    fn spawn_failures_and_kills() {
        let mut sim = SimPlatform::new();
        sim.fail_spawn("boom");
        assert!(sim.spawn("boom").is_err());
        assert!(sim.spawn("   ").is_err());

        let handle = sim.spawn("sleep 10").unwrap();
        sim.kill(handle).unwrap();
        assert_eq!(sim.reap_blocking(handle).unwrap(), Outcome::Signaled(9));
        assert!(sim.resume(handle).is_err());
    }
}
