use super::error::TableFull;
use super::history::CommandId;
use super::metrics::Metrics;
use crate::platform::{Outcome, ProcessHandle};

// Index into the job table. Lower ids were admitted earlier.
pub type JobId = usize;
// Milliseconds relative to the scheduler epoch.
pub type Millis = u64;

pub const MAX_PROCS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Unstarted,
    Running,
    Suspended,
    Terminal,
}

#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pub id: JobId,
    pub command: String,
    pub command_id: CommandId,
    pub handle: Option<ProcessHandle>,
    pub state: JobState,
    /// Exited normally, whatever the status.
    pub finished: bool,
    /// Spawn failed, killed by a signal, or exited non-zero.
    pub error: bool,
    pub arrival_time: Millis,
    pub start_time: Option<Millis>,
    pub completion_time: Option<Millis>,
    pub metrics: Option<Metrics>,
    pub estimated_burst: Option<f64>,
    pub cpu_time: Millis,
    pub slices: u32,
}

impl ProcessRecord {
    pub fn started(&self) -> bool {
        self.start_time.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.state == JobState::Terminal
    }

    /// Count one timed slice worth `ms` of service.
    pub fn charge(&mut self, ms: Millis) {
        self.cpu_time = self.cpu_time.saturating_add(ms);
        self.slices += 1;
    }

    pub fn mark_started(&mut self, at: Millis) {
        if self.start_time.is_none() {
            self.start_time = Some(at);
        }
    }

    pub fn mark_spawned(&mut self, handle: ProcessHandle) {
        debug_assert_eq!(
            self.state,
            JobState::Unstarted,
            "Job {} spawned twice",
            self.id
        );
        self.handle = Some(handle);
        self.state = JobState::Suspended;
    }

    pub fn mark_running(&mut self) {
        debug_assert!(
            self.state == JobState::Suspended || self.state == JobState::Running,
            "Job {} resumed from {:?}",
            self.id,
            self.state
        );
        self.state = JobState::Running;
    }

    pub fn mark_suspended(&mut self) {
        debug_assert_ne!(
            self.state,
            JobState::Terminal,
            "Terminal job {} cannot be suspended",
            self.id
        );
        self.state = JobState::Suspended;
    }

    // `None` means the job never got a process.
    pub fn mark_terminal(&mut self, outcome: Option<Outcome>, completion_time: Millis) {
        debug_assert_ne!(
            self.state,
            JobState::Terminal,
            "Job {} reaped twice",
            self.id
        );
        debug_assert!(self.completion_time.is_none());

        self.state = JobState::Terminal;
        self.completion_time = Some(completion_time);
        match outcome {
            Some(outcome) => {
                self.finished = outcome.finished();
                self.error = outcome.error();
            }
            None => {
                self.finished = false;
                self.error = true;
            }
        }
        let start = self.start_time.unwrap_or(completion_time);
        self.metrics = Some(Metrics::compute(
            self.arrival_time,
            start,
            completion_time,
            self.cpu_time,
        ));
    }

    /// Killed at shutdown before it could finish. Orphans carry no metrics
    /// and are left out of the report.
    pub fn mark_orphaned(&mut self, at: Millis) {
        debug_assert_ne!(self.state, JobState::Terminal);
        self.state = JobState::Terminal;
        self.completion_time = Some(at);
        self.finished = false;
        self.error = true;
    }
}

/// Arena of every job submitted during one run.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<ProcessRecord>,
}

impl JobTable {
    pub fn new() -> Self {
        Self {
            jobs: Vec::with_capacity(MAX_PROCS),
        }
    }

    pub fn admit(
        &mut self,
        command: String,
        command_id: CommandId,
        arrival_time: Millis,
    ) -> Result<JobId, TableFull> {
        if self.jobs.len() >= MAX_PROCS {
            return Err(TableFull {
                command,
                capacity: MAX_PROCS,
            });
        }

        let id = self.jobs.len();
        self.jobs.push(ProcessRecord {
            id,
            command,
            command_id,
            handle: None,
            state: JobState::Unstarted,
            finished: false,
            error: false,
            arrival_time,
            start_time: None,
            completion_time: None,
            metrics: None,
            estimated_burst: None,
            cpu_time: 0,
            slices: 0,
        });
        Ok(id)
    }

    pub fn get(&self, id: JobId) -> &ProcessRecord {
        &self.jobs[id]
    }

    pub fn get_mut(&mut self, id: JobId) -> &mut ProcessRecord {
        &mut self.jobs[id]
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.jobs.iter()
    }

    pub fn pending_ids(&self) -> Vec<JobId> {
        self.jobs
            .iter()
            .filter(|job| !job.is_terminal())
            .map(|job| job.id)
            .collect()
    }

    pub fn all_terminal(&self) -> bool {
        self.jobs.iter().all(ProcessRecord::is_terminal)
    }
}
