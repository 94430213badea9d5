use crate::core::state::Millis;
use crate::platform::Outcome;

/// What a simulated program does once it gets the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimProgram {
    pub run_time: Millis,
    pub outcome: Outcome,
}

impl SimProgram {
    pub fn exiting(run_time: Millis, code: i32) -> Self {
        Self {
            run_time,
            outcome: Outcome::Exited(code),
        }
    }

    pub fn killed(run_time: Millis, signal: i32) -> Self {
        Self {
            run_time,
            outcome: Outcome::Signaled(signal),
        }
    }

    /// Built-in programs: `sleep <secs>`, `true` and `false`. Anything else
    /// behaves like a program that cannot be executed.
    pub fn from_command(command: &str) -> Self {
        let mut words = command.split_whitespace();
        match (words.next(), words.next()) {
            (Some("sleep"), Some(secs)) => match secs.parse::<f64>() {
                Ok(secs) if secs >= 0.0 => Self::exiting((secs * 1000.0).round() as Millis, 0),
                _ => Self::exiting(0, 1),
            },
            (Some("true"), _) => Self::exiting(0, 0),
            _ => Self::exiting(0, 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimState {
    Stopped,
    Running,
    Exited,
    Reaped,
}

#[derive(Debug, Clone)]
pub struct SimProcess {
    pub command: String,
    pub program: SimProgram,
    pub state: SimState,
    pub consumed: Millis,
    pub exited_at: Option<Millis>,
    pub killed: bool,
}

impl SimProcess {
    pub fn new(command: &str, program: SimProgram) -> Self {
        Self {
            command: command.to_owned(),
            program,
            state: SimState::Stopped,
            consumed: 0,
            exited_at: None,
            killed: false,
        }
    }

    pub fn remaining(&self) -> Millis {
        self.program.run_time.saturating_sub(self.consumed)
    }

    pub fn outcome(&self) -> Outcome {
        if self.killed {
            Outcome::Signaled(9)
        } else {
            self.program.outcome
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_programs() {
        assert_eq!(SimProgram::from_command("sleep 0.25"), SimProgram::exiting(250, 0));
        assert_eq!(SimProgram::from_command("true"), SimProgram::exiting(0, 0));
        assert_eq!(SimProgram::from_command("false"), SimProgram::exiting(0, 1));
        assert_eq!(SimProgram::from_command("sleep soon"), SimProgram::exiting(0, 1));
        assert_eq!(SimProgram::from_command("no-such-tool -x"), SimProgram::exiting(0, 1));
    }
}
