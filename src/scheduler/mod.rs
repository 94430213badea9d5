pub mod fcfs;
pub mod mlfq;
pub mod round_robin;
pub mod sjf;

use crate::core::{SchedCore, SchedError};
use crate::platform::Platform;
pub use fcfs::Fcfs;
pub use mlfq::Mlfq;
pub use round_robin::RoundRobin;
pub use sjf::ShortestJobFirst;

/// A scheduling policy. `run` drives the core until the policy's
/// termination condition holds and leaves every started child reaped.
pub trait Scheduler {
    /// File the per-job report is written to.
    fn report_name(&self) -> &'static str;

    fn run<P: Platform>(&mut self, core: &mut SchedCore<P>) -> Result<(), SchedError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::core::{
        CoreSettings, JobId, Reporter, SchedCore, SchedEvent, metrics::tests::SharedBuf,
        state::Millis,
    };
    use crate::feed::{ArrivalFeed, tests::Script};
    use crate::sim::SimPlatform;
    use std::io::{Cursor, Read};

    pub(crate) struct Harness {
        pub core: SchedCore<SimPlatform>,
        pub report: SharedBuf,
        pub trace: SharedBuf,
    }

    impl Harness {
        pub(crate) fn new(sim: SimPlatform) -> Self {
            let report = SharedBuf::default();
            let trace = SharedBuf::default();
            let core = SchedCore::new(sim, Reporter::new(report.clone(), trace.clone()))
                .record_events();
            Self {
                core,
                report,
                trace,
            }
        }

        pub(crate) fn offline(sim: SimPlatform, commands: &[&str]) -> Self {
            let mut harness = Self::new(sim);
            for command in commands {
                harness.core.submit(command);
            }
            harness
        }

        pub(crate) fn map(
            self,
            f: impl FnOnce(SchedCore<SimPlatform>) -> SchedCore<SimPlatform>,
        ) -> Self {
            Self {
                core: f(self.core),
                report: self.report,
                trace: self.trace,
            }
        }

        /// Online run fed from `input` that returns once every job is done.
        pub(crate) fn drained(self, input: &'static str) -> Self {
            let settings = CoreSettings {
                exit_when_drained: true,
                ..CoreSettings::default()
            };
            let feed = ArrivalFeed::batch(Box::new(Cursor::new(input)) as Box<dyn Read>);
            self.map(|core| core.with_settings(settings).with_feed(feed))
        }

        /// Online run fed by a scripted terminal (see `Script`) that returns
        /// once the script ends and every job is done.
        pub(crate) fn typed(self, steps: &[Option<&'static str>]) -> Self {
            let settings = CoreSettings {
                exit_when_drained: true,
                ..CoreSettings::default()
            };
            let feed = ArrivalFeed::interactive(Box::new(Script::new(steps)) as Box<dyn Read>);
            self.map(|core| core.with_settings(settings).with_feed(feed))
        }

        /// Check the timing identities of every finished job against both
        /// its record and its report row. Commands must be unique.
        pub(crate) fn assert_metric_identities(&self) {
            let lines = self.report_lines();
            for job in self.core.jobs.iter().filter(|job| job.metrics.is_some()) {
                let metrics = job.metrics.unwrap();
                let completion = job.completion_time.unwrap();
                let start = job.start_time.unwrap();
                assert_eq!(metrics.turnaround, completion - job.arrival_time);
                assert_eq!(
                    metrics.waiting,
                    metrics.turnaround.saturating_sub(job.cpu_time)
                );
                assert_eq!(metrics.response, start.saturating_sub(job.arrival_time));

                let prefix = format!("{},", job.command);
                let row = lines.iter().find(|line| line.starts_with(&prefix)).unwrap();
                let fields: Vec<Millis> = row
                    .rsplitn(5, ',')
                    .take(4)
                    .map(|field| field.parse().unwrap())
                    .collect();
                // rsplitn yields the columns back to front
                assert_eq!(
                    fields,
                    vec![metrics.response, metrics.waiting, metrics.turnaround, completion]
                );
            }
        }

        /// Jobs in the order their slices ran.
        pub(crate) fn slice_order(&self) -> Vec<JobId> {
            self.core
                .events()
                .iter()
                .filter_map(|event| match event {
                    SchedEvent::Slice { job, .. } => Some(*job),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn report_lines(&self) -> Vec<String> {
            self.report.contents().lines().map(str::to_owned).collect()
        }
    }
}
