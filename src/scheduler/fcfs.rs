use log::debug;

use super::Scheduler;
use crate::core::{SchedCore, SchedError};
use crate::platform::Platform;

/// Runs every submitted job to completion in submission order.
#[derive(Debug, Default)]
pub struct Fcfs;

impl Scheduler for Fcfs {
    fn report_name(&self) -> &'static str {
        "result_offline_FCFS_output.csv"
    }

    fn run<P: Platform>(&mut self, core: &mut SchedCore<P>) -> Result<(), SchedError> {
        core.begin();
        for job in core.jobs.pending_ids() {
            if !core.dispatch(job)? {
                continue;
            }

            // Measured from dispatch, so waiting and response agree exactly.
            let start = core.jobs.get(job).start_time.unwrap_or_else(|| core.now());
            debug!("fcfs running job {job} from {start} ms");
            let outcome = core.run_to_completion(job)?;
            let end = core.now();

            core.jobs.get_mut(job).charge(end - start);
            core.trace_slice(job, None, start, end)?;
            core.complete(job, outcome, end)?;
            core.observe(None);
        }
        Ok(())
    }
}
