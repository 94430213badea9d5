use super::{
    queue::Level,
    state::{JobId, Millis},
};
use crate::platform::{Outcome, ProcessHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedEvent {
    Admitted {
        job: JobId,
        arrival: Millis,
    },
    Spawned {
        job: JobId,
        handle: ProcessHandle,
    },
    // Spawn refused; the job never ran
    Abandoned {
        job: JobId,
    },
    // Online placement by predicted burst
    Placed {
        job: JobId,
        level: Level,
    },
    Slice {
        job: JobId,
        level: Option<Level>,
        start: Millis,
        end: Millis,
    },
    Demoted {
        job: JobId,
        from: Level,
        to: Level,
    },
    Boosted {
        at: Millis,
        moved: Vec<JobId>,
    },
    Completed {
        job: JobId,
        outcome: Outcome,
        at: Millis,
    },
    // Killed at shutdown
    Orphaned {
        job: JobId,
    },
}
