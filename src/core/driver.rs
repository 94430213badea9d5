use log::{debug, info, warn};
use std::{io::Read, time::Duration};

use super::{
    error::SchedError,
    event::SchedEvent,
    history::CommandHistory,
    metrics::{Reporter, RunSummary},
    observer::Observer,
    queue::Level,
    state::{JobId, JobTable, Millis},
};
use crate::{
    feed::ArrivalFeed,
    platform::{Outcome, Platform, ProcessHandle},
    signal::StopFlag,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreSettings {
    /// Sleep between exit polls while racing a quantum.
    pub poll_interval: Duration,
    /// Sleep when an online policy has nothing to run.
    pub idle_interval: Duration,
    /// Let online policies return once input is exhausted and every job is
    /// terminal, instead of waiting for an interrupt.
    pub exit_when_drained: bool,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            idle_interval: Duration::from_millis(1),
            exit_when_drained: false,
        }
    }
}

pub type BoxedFeed = ArrivalFeed<Box<dyn Read>>;

/// Everything a policy loop drives: the platform, the job table, the
/// command history, the report and the arrival feed.
pub struct SchedCore<P: Platform> {
    pub platform: P,
    pub jobs: JobTable,
    pub history: CommandHistory,
    reporter: Reporter,
    feed: Option<BoxedFeed>,
    stop: StopFlag,
    settings: CoreSettings,
    epoch: Millis,
    events: Option<Vec<SchedEvent>>,
    observer: Observer,
}

impl<P: Platform> SchedCore<P> {
    pub fn new(platform: P, reporter: Reporter) -> Self {
        let epoch = platform.now();
        Self {
            platform,
            jobs: JobTable::new(),
            history: CommandHistory::new(),
            reporter,
            feed: None,
            stop: StopFlag::new(),
            settings: CoreSettings::default(),
            epoch,
            events: None,
            observer: Observer::new(),
        }
    }

    pub fn with_settings(mut self, settings: CoreSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_history(mut self, history: CommandHistory) -> Self {
        self.history = history;
        self
    }

    pub fn with_feed(mut self, feed: BoxedFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn with_stop(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    /// Keep every [`SchedEvent`] for later inspection.
    pub fn record_events(mut self) -> Self {
        self.events = Some(Vec::new());
        self
    }

    pub fn settings(&self) -> &CoreSettings {
        &self.settings
    }

    pub fn events(&self) -> &[SchedEvent] {
        self.events.as_deref().unwrap_or_default()
    }

    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    pub fn push_event(&mut self, event: SchedEvent) {
        if let Some(events) = self.events.as_mut() {
            events.push(event);
        }
    }

    /// Start the run clock. All timestamps are relative to this instant.
    pub fn begin(&mut self) {
        self.epoch = self.platform.now();
    }

    pub fn now(&self) -> Millis {
        self.platform.now().saturating_sub(self.epoch)
    }

    /// Submit a job known before the run starts. Its arrival time is 0.
    pub fn submit(&mut self, command: &str) -> Option<JobId> {
        self.admit_at(command.to_owned(), 0)
    }

    fn admit_at(&mut self, command: String, arrival: Millis) -> Option<JobId> {
        let command_id = self.history.intern(&command);
        match self.jobs.admit(command, command_id, arrival) {
            Ok(job) => {
                debug!("admitted job {job} at {arrival} ms");
                self.push_event(SchedEvent::Admitted { job, arrival });
                Some(job)
            }
            Err(full) => {
                warn!("{full}");
                None
            }
        }
    }

    /// Admit whatever the feed has ready, stamped with the current time.
    pub fn admit_arrivals(&mut self) -> Result<Vec<JobId>, SchedError> {
        let lines = match self.feed.as_mut() {
            Some(feed) => feed.poll()?,
            None => return Ok(Vec::new()),
        };
        let mut admitted = Vec::with_capacity(lines.len());
        for line in lines {
            let arrival = self.now();
            admitted.extend(self.admit_at(line, arrival));
        }
        Ok(admitted)
    }

    fn feed_exhausted(&self) -> bool {
        self.feed.as_ref().is_none_or(ArrivalFeed::is_exhausted)
    }

    pub fn should_stop(&self) -> bool {
        if self.stop.is_raised() {
            return true;
        }
        self.settings.exit_when_drained && self.feed_exhausted() && self.jobs.all_terminal()
    }

    pub fn idle(&mut self) {
        let interval = self.settings.idle_interval;
        self.platform.sleep(interval);
    }

    fn handle(&self, job: JobId) -> Result<ProcessHandle, SchedError> {
        self.jobs.get(job).handle.ok_or(SchedError::NotSpawned(job))
    }

    /// Make sure `job` has a (suspended) process. Returns `false` when the
    /// spawn was refused; the job is then terminal and already reported.
    pub fn dispatch(&mut self, job: JobId) -> Result<bool, SchedError> {
        if self.jobs.get(job).handle.is_some() {
            return Ok(true);
        }

        let now = self.now();
        self.jobs.get_mut(job).mark_started(now);
        match self.platform.spawn(&self.jobs.get(job).command) {
            Ok(handle) => {
                self.jobs.get_mut(job).mark_spawned(handle);
                self.push_event(SchedEvent::Spawned { job, handle });
                Ok(true)
            }
            Err(err) => {
                warn!(
                    "cannot start job {job} ({:?}): {err}",
                    self.jobs.get(job).command
                );
                self.abandon(job)?;
                Ok(false)
            }
        }
    }

    fn abandon(&mut self, job: JobId) -> Result<(), SchedError> {
        let now = self.now();
        let record = self.jobs.get_mut(job);
        record.mark_terminal(None, now);
        self.reporter.record(self.jobs.get(job))?;
        self.push_event(SchedEvent::Abandoned { job });
        Ok(())
    }

    fn resume(&mut self, job: JobId) -> Result<ProcessHandle, SchedError> {
        let handle = self.handle(job)?;
        self.platform.resume(handle)?;
        self.jobs.get_mut(job).mark_running();
        Ok(handle)
    }

    fn suspend(&mut self, job: JobId, handle: ProcessHandle) -> Result<(), SchedError> {
        self.platform.suspend(handle)?;
        self.jobs.get_mut(job).mark_suspended();
        Ok(())
    }

    /// Resume for exactly `quantum` of wall time, suspend, then check once
    /// whether the child exited meanwhile.
    pub fn run_slice(
        &mut self,
        job: JobId,
        quantum: Millis,
    ) -> Result<Option<Outcome>, SchedError> {
        let handle = self.resume(job)?;
        self.platform.sleep(Duration::from_millis(quantum));
        self.suspend(job, handle)?;
        Ok(self.platform.try_reap(handle)?)
    }

    /// Resume and poll until the child exits or `quantum` elapses, measured
    /// from the resume. The child is suspended again if it overran.
    pub fn run_bounded(
        &mut self,
        job: JobId,
        quantum: Millis,
    ) -> Result<Option<Outcome>, SchedError> {
        let handle = self.resume(job)?;
        let deadline = self.platform.now() + quantum;
        let poll = self.settings.poll_interval;
        match self.platform.wait_until(handle, deadline, poll)? {
            Some(outcome) => Ok(Some(outcome)),
            None => {
                self.suspend(job, handle)?;
                Ok(None)
            }
        }
    }

    /// Resume and block until the child exits.
    pub fn run_to_completion(&mut self, job: JobId) -> Result<Outcome, SchedError> {
        let handle = self.resume(job)?;
        Ok(self.platform.reap_blocking(handle)?)
    }

    pub fn trace_slice(
        &mut self,
        job: JobId,
        level: Option<Level>,
        start: Millis,
        end: Millis,
    ) -> Result<(), SchedError> {
        self.reporter.slice(&self.jobs.get(job).command, start, end)?;
        self.push_event(SchedEvent::Slice {
            job,
            level,
            start,
            end,
        });
        Ok(())
    }

    /// Finalize a reaped job: metrics, report row, event.
    pub fn complete(
        &mut self,
        job: JobId,
        outcome: Outcome,
        at: Millis,
    ) -> Result<(), SchedError> {
        self.jobs.get_mut(job).mark_terminal(Some(outcome), at);
        let record = self.jobs.get(job);
        self.reporter.record(record)?;
        info!(
            "job {job} ({:?}) {outcome} at {at} ms after {} ms of cpu",
            record.command, record.cpu_time
        );
        self.push_event(SchedEvent::Completed { job, outcome, at });
        Ok(())
    }

    pub fn observe(&mut self, queued: impl IntoIterator<Item = JobId>) {
        self.observer.observe(&self.jobs, queued);
    }

    /// Kill and reap every child that was started but never finished. These
    /// jobs get no report row. A child that already exited on its own is
    /// completed normally instead.
    pub fn shutdown(&mut self) -> Result<(), SchedError> {
        let orphans: Vec<(JobId, ProcessHandle)> = self
            .jobs
            .iter()
            .filter(|job| !job.is_terminal())
            .filter_map(|job| job.handle.map(|handle| (job.id, handle)))
            .collect();

        for (job, handle) in orphans {
            if let Some(outcome) = self.platform.try_reap(handle)? {
                let now = self.now();
                self.complete(job, outcome, now)?;
                continue;
            }
            warn!("killing unfinished job {job} ({handle})");
            self.platform.kill(handle)?;
            self.platform.reap_blocking(handle)?;
            let now = self.now();
            self.jobs.get_mut(job).mark_orphaned(now);
            self.push_event(SchedEvent::Orphaned { job });
        }
        Ok(())
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_records(self.jobs.iter())
    }
}
