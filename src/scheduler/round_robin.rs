use log::debug;

use super::Scheduler;
use crate::core::{LevelQueue, SchedCore, SchedError, state::Millis};
use crate::platform::Platform;

/// Offline round robin over a single bounded queue.
///
/// Every slice lasts exactly one quantum of wall time, even when the child
/// exits early, so service is counted as `slices * quantum`. The last job
/// standing is instead run to completion; that final run is not a slice and
/// is not counted as service.
#[derive(Debug)]
pub struct RoundRobin {
    quantum: Millis,
}

impl RoundRobin {
    pub fn new(quantum: Millis) -> Self {
        debug_assert!(quantum > 0, "Quantum must be positive");
        Self { quantum }
    }

    pub fn quantum(&self) -> Millis {
        self.quantum
    }
}

impl Scheduler for RoundRobin {
    fn report_name(&self) -> &'static str {
        "result_offline_RR_output.csv"
    }

    fn run<P: Platform>(&mut self, core: &mut SchedCore<P>) -> Result<(), SchedError> {
        core.begin();
        let mut queue = LevelQueue::default();
        for job in core.jobs.pending_ids() {
            queue.enqueue(job)?;
        }

        while let Some(job) = queue.dequeue() {
            if !core.dispatch(job)? {
                continue;
            }

            let start = core.now();
            let outcome = if queue.is_empty() {
                // Not a timed slice, so it adds nothing to the service count.
                debug!("rr running last job {job} to completion");
                Some(core.run_to_completion(job)?)
            } else {
                let outcome = core.run_slice(job, self.quantum)?;
                core.jobs.get_mut(job).charge(self.quantum);
                outcome
            };
            let end = core.now();

            core.trace_slice(job, None, start, end)?;
            match outcome {
                Some(outcome) => core.complete(job, outcome, end)?,
                None => queue.enqueue(job)?,
            }
            core.observe(queue.iter());
        }
        Ok(())
    }
}
