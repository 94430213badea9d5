use rustc_hash::FxHashSet;

use super::state::{JobId, JobState, JobTable};

/// Checks queue invariants after every slice in debug builds.
#[derive(Debug, Default)]
pub struct Observer {
    step: u64,
}

impl Observer {
    pub fn new() -> Self {
        Self { step: 0 }
    }

    pub fn steps(&self) -> u64 {
        self.step
    }

    pub fn observe(&mut self, jobs: &JobTable, queued: impl IntoIterator<Item = JobId>) {
        self.step += 1;
        if !cfg!(debug_assertions) {
            return;
        }

        let mut seen = FxHashSet::default();
        for job_id in queued {
            let fresh = seen.insert(job_id);
            debug_assert!(
                fresh,
                "Job {job_id} queued more than once at step {}",
                self.step
            );
            debug_assert!(job_id < jobs.len(), "Queued job {job_id} unknown");

            let job = jobs.get(job_id);
            debug_assert_ne!(
                job.state,
                JobState::Terminal,
                "Terminal job {job_id} still queued"
            );
            debug_assert_ne!(
                job.state,
                JobState::Running,
                "Running job {job_id} must not be queued"
            );
        }

        for job in jobs.iter() {
            debug_assert!(
                !(job.is_terminal() && job.completion_time.is_none()),
                "Terminal job {} has no completion time",
                job.id
            );
            if let (Some(start), Some(end)) = (job.start_time, job.completion_time) {
                debug_assert!(start <= end, "Job {} completed before it started", job.id);
            }
        }
    }
}
