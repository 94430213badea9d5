use keyed_priority_queue::KeyedPriorityQueue;
use log::debug;
use std::cmp::Ordering;

use super::Scheduler;
use crate::core::{JobId, SchedCore, SchedError};
use crate::platform::Platform;

/// Predicted burst of a ready job.
#[derive(Debug, Clone, Copy)]
struct Shortest {
    estimate: f64,
    job: JobId,
}

// KeyedPriorityQueue is a max-heap, so the smallest estimate has to compare
// greatest. Equal estimates go to the earliest admitted job.
impl Ord for Shortest {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .estimate
            .total_cmp(&self.estimate)
            .then_with(|| other.job.cmp(&self.job))
    }
}

impl PartialOrd for Shortest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Shortest {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Shortest {}

/// Online, non-preemptive shortest job first. Each pass re-estimates every
/// ready job from the last `window` bursts of its command and runs the
/// shortest to completion.
#[derive(Debug)]
pub struct ShortestJobFirst {
    window: usize,
}

impl ShortestJobFirst {
    pub fn new(window: usize) -> Self {
        debug_assert!(window > 0, "Window must hold at least one burst");
        Self { window }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    fn estimate<P: Platform>(&self, core: &SchedCore<P>, job: JobId) -> Shortest {
        let command_id = core.jobs.get(job).command_id;
        Shortest {
            estimate: core.history.estimate_of(command_id, self.window),
            job,
        }
    }
}

impl Scheduler for ShortestJobFirst {
    fn report_name(&self) -> &'static str {
        "result_online_SJF_output.csv"
    }

    fn run<P: Platform>(&mut self, core: &mut SchedCore<P>) -> Result<(), SchedError> {
        core.begin();
        let mut ready: KeyedPriorityQueue<JobId, Shortest> = KeyedPriorityQueue::new();

        while !core.should_stop() {
            for job in core.admit_arrivals()? {
                ready.push(job, self.estimate(core, job));
            }
            // Bursts recorded since the last pass change the estimates.
            let queued: Vec<JobId> = ready.iter().map(|(job, _)| *job).collect();
            for job in queued {
                ready.push(job, self.estimate(core, job));
            }
            core.observe(ready.iter().map(|(job, _)| *job));

            let Some((job, Shortest { estimate, .. })) = ready.pop() else {
                core.idle();
                continue;
            };
            core.jobs.get_mut(job).estimated_burst = Some(estimate);
            debug!("sjf picked job {job} with estimate {estimate:.1} ms");
            if !core.dispatch(job)? {
                continue;
            }

            let start = core.jobs.get(job).start_time.unwrap_or_else(|| core.now());
            let outcome = core.run_to_completion(job)?;
            let end = core.now();
            let burst = end - start;

            let record = core.jobs.get_mut(job);
            record.charge(burst);
            let command_id = record.command_id;
            core.history.record_burst_for(command_id, burst);
            core.trace_slice(job, None, start, end)?;
            core.complete(job, outcome, end)?;
        }

        core.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CommandHistory;
    use crate::scheduler::testing::Harness;
    use crate::sim::{SimPlatform, SimProgram};

    #[test]
    fn smallest_estimate_wins() {
        let mut pq = KeyedPriorityQueue::new();
        for (job, estimate) in [(0, 50.0), (1, 10.0), (2, 30.0), (3, 10.0)] {
            pq.push(job, Shortest { estimate, job });
        }
        let order: Vec<JobId> = std::iter::from_fn(|| pq.pop().map(|(job, _)| job)).collect();
        assert_eq!(order, vec![1, 3, 2, 0]);
    }

    #[test]
    fn runs_shortest_predicted_first() {
        let mut history = CommandHistory::new();
        history.record_burst("a", 50);
        history.record_burst("b", 10);
        history.record_burst("c", 30);
        let mut sim = SimPlatform::new();
        sim.define("a", SimProgram::exiting(50, 0))
            .define("b", SimProgram::exiting(10, 0))
            .define("c", SimProgram::exiting(30, 0));
        let mut h = Harness::new(sim)
            .map(|core| core.with_history(history))
            .drained("a\nb\nc\n");
        ShortestJobFirst::new(5).run(&mut h.core).unwrap();

        assert_eq!(h.slice_order(), vec![1, 2, 0]);
        assert_eq!(
            h.report_lines(),
            vec!["b,Yes,No,10,10,0,0", "c,Yes,No,40,40,10,10", "a,Yes,No,90,90,40,40"]
        );
        assert_eq!(h.core.jobs.get(0).estimated_burst, Some(50.0));
    }

    #[test]
    fn unknown_commands_tie_to_submission_order() {
        let mut h =
            Harness::new(SimPlatform::new()).drained("sleep 0.03\nsleep 0.02\nsleep 0.01\n");
        ShortestJobFirst::new(3).run(&mut h.core).unwrap();

        // All three share the default estimate.
        assert_eq!(h.slice_order(), vec![0, 1, 2]);
        assert!(
            h.core
                .jobs
                .iter()
                .all(|job| job.estimated_burst == Some(1000.0))
        );
    }

    #[test]
    fn late_arrivals_are_measured_from_arrival() {
        let mut sim = SimPlatform::new();
        sim.define("a", SimProgram::exiting(30, 0))
            .define("b", SimProgram::exiting(15, 0))
            .define("c", SimProgram::exiting(25, 0));
        // c shows up while a is running and waits behind b.
        let mut h = Harness::new(sim).typed(&[Some("a\nb\n"), None, Some("c\n")]);
        ShortestJobFirst::new(3).run(&mut h.core).unwrap();

        assert_eq!(h.slice_order(), vec![0, 1, 2]);
        assert_eq!(h.core.jobs.get(2).arrival_time, 30);
        assert_eq!(
            h.report_lines(),
            vec!["a,Yes,No,30,30,0,0", "b,Yes,No,45,45,30,30", "c,Yes,No,70,40,15,15"]
        );
        h.assert_metric_identities();
    }

    #[test]
    fn estimates_follow_recorded_bursts() {
        let mut sim = SimPlatform::new();
        sim.define("slow", SimProgram::exiting(80, 0))
            .define("flaky", SimProgram::exiting(20, 1));
        let mut history = CommandHistory::new();
        history.record_burst("slow", 400);
        history.record_burst("slow", 600);
        let mut h = Harness::new(sim)
            .map(|core| core.with_history(history))
            .drained("flaky\nslow\n");
        ShortestJobFirst::new(2).run(&mut h.core).unwrap();

        // slow averages 500 ms, under flaky's 1000 ms default.
        assert_eq!(h.slice_order(), vec![1, 0]);
        // Failed runs still feed the history.
        assert_eq!(h.core.history.average("flaky"), Some(20.0));
        assert_eq!(h.core.history.estimate("slow", 2), (600.0 + 80.0) / 2.0);
        assert!(h.core.jobs.get(0).error);
    }
}
