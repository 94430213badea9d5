use log::{debug, info};

use super::Scheduler;
use crate::core::{JobId, Level, LevelSet, SchedCore, SchedError, SchedEvent, state::Millis};
use crate::platform::Platform;

/// Three-level feedback queue.
///
/// A job that uses up its quantum is suspended and drops one level; one that
/// exits inside it is finished. Every `boost` ms the lower levels are folded
/// back into the top. The online variant admits arrivals while running and
/// places each new job by the average burst of its command so far.
#[derive(Debug)]
pub struct Mlfq {
    quanta: [Millis; 3],
    boost: Millis,
    online: bool,
}

impl Mlfq {
    pub fn offline(quanta: [Millis; 3], boost: Millis) -> Self {
        Self::new(quanta, boost, false)
    }

    pub fn online(quanta: [Millis; 3], boost: Millis) -> Self {
        Self::new(quanta, boost, true)
    }

    fn new(quanta: [Millis; 3], boost: Millis, online: bool) -> Self {
        debug_assert!(
            quanta[0] > 0 && quanta[0] <= quanta[1] && quanta[1] <= quanta[2],
            "Quanta must be positive and non-decreasing: {quanta:?}"
        );
        Self {
            quanta,
            boost,
            online,
        }
    }

    pub fn quantum(&self, level: Level) -> Millis {
        self.quanta[level.index()]
    }

    /// Entry level for a new online job, from the plain average burst of its
    /// command. Commands never seen before start in the middle.
    pub fn placement(&self, average: Option<f64>) -> Level {
        match average {
            None => Level::Middle,
            Some(avg) if avg < self.quanta[0] as f64 => Level::Top,
            Some(avg) if avg < self.quanta[1] as f64 => Level::Middle,
            Some(_) => Level::Bottom,
        }
    }

    fn admit<P: Platform>(
        &self,
        core: &mut SchedCore<P>,
        levels: &mut LevelSet,
    ) -> Result<(), SchedError> {
        for job in core.admit_arrivals()? {
            let command_id = core.jobs.get(job).command_id;
            let level = self.placement(core.history.average_of(command_id));
            levels.push(level, job)?;
            debug!("mlfq placed job {job} at {level:?}");
            core.push_event(SchedEvent::Placed { job, level });
        }
        Ok(())
    }

    fn boost_due<P: Platform>(
        &self,
        core: &mut SchedCore<P>,
        levels: &mut LevelSet,
        next_boost: &mut Millis,
    ) -> Result<(), SchedError> {
        if self.boost == 0 {
            return Ok(());
        }
        let now = core.now();
        while now >= *next_boost {
            let moved = levels.boost()?;
            if !moved.is_empty() {
                debug!("boost at {} ms moved {} jobs to the top", *next_boost, moved.len());
            }
            core.push_event(SchedEvent::Boosted {
                at: *next_boost,
                moved,
            });
            *next_boost += self.boost;
        }
        Ok(())
    }

    /// One bounded slice of `job` at `level`, then finish or demote it.
    fn slice<P: Platform>(
        &self,
        core: &mut SchedCore<P>,
        levels: &mut LevelSet,
        level: Level,
        job: JobId,
    ) -> Result<(), SchedError> {
        let start = core.now();
        let outcome = core.run_bounded(job, self.quantum(level))?;
        let end = core.now();
        let ran = end - start;

        core.jobs.get_mut(job).charge(ran);
        core.trace_slice(job, Some(level), start, end)?;
        match outcome {
            Some(outcome) => {
                if self.online && !outcome.error() {
                    let command_id = core.jobs.get(job).command_id;
                    core.history.record_burst_for(command_id, ran);
                }
                core.complete(job, outcome, end)
            }
            None => {
                let to = level.demoted();
                levels.push(to, job)?;
                if to != level {
                    core.push_event(SchedEvent::Demoted {
                        job,
                        from: level,
                        to,
                    });
                }
                Ok(())
            }
        }
    }
}

impl Scheduler for Mlfq {
    fn report_name(&self) -> &'static str {
        if self.online {
            "result_online_MLFQ_output.csv"
        } else {
            "result_offline_MLFQ_output.csv"
        }
    }

    fn run<P: Platform>(&mut self, core: &mut SchedCore<P>) -> Result<(), SchedError> {
        core.begin();
        let mut levels = LevelSet::new();
        let mut next_boost = self.boost;
        if !self.online {
            for job in core.jobs.pending_ids() {
                levels.push(Level::Top, job)?;
            }
        }

        loop {
            if self.online {
                if core.should_stop() {
                    break;
                }
                self.admit(core, &mut levels)?;
            }

            let Some((level, job)) = levels.pop() else {
                if !self.online {
                    break;
                }
                core.idle();
                continue;
            };
            if !core.dispatch(job)? {
                continue;
            }

            self.slice(core, &mut levels, level, job)?;
            self.boost_due(core, &mut levels, &mut next_boost)?;
            core.observe(levels.iter());
        }

        if self.online {
            core.shutdown()?;
        }
        info!("mlfq finished after {} observed slices", core.observer().steps());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CommandHistory;
    use crate::feed::ArrivalFeed;
    use crate::scheduler::testing::Harness;
    use crate::signal::StopFlag;
    use crate::sim::{SimPlatform, SimProgram};
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use std::collections::VecDeque;
    use std::io::{self, ErrorKind, Read};

    /// Types scripted chunks (`None` is a pass with nothing typed) and hits
    /// Ctrl-C once the script runs out.
    struct Typist {
        steps: VecDeque<Option<&'static str>>,
        stop: StopFlag,
    }

    impl Read for Typist {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                Some(Some(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(chunk.as_bytes());
                    Ok(chunk.len())
                }
                Some(None) => Err(ErrorKind::WouldBlock.into()),
                None => {
                    self.stop.raise();
                    Err(ErrorKind::WouldBlock.into())
                }
            }
        }
    }

    fn demotions(h: &Harness) -> Vec<(JobId, Level, Level)> {
        h.core
            .events()
            .iter()
            .filter_map(|event| match *event {
                SchedEvent::Demoted { job, from, to } => Some((job, from, to)),
                _ => None,
            })
            .collect()
    }

    fn slice_levels(h: &Harness) -> Vec<(JobId, Level)> {
        h.core
            .events()
            .iter()
            .filter_map(|event| match *event {
                SchedEvent::Slice {
                    job,
                    level: Some(level),
                    ..
                } => Some((job, level)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn overruns_are_demoted() {
        let mut sim = SimPlatform::new();
        sim.define("a", SimProgram::exiting(25, 0))
            .define("b", SimProgram::exiting(40, 0));
        let mut h = Harness::offline(sim, &["a", "b"]);
        Mlfq::offline([10, 20, 40], 0).run(&mut h.core).unwrap();

        assert_eq!(
            slice_levels(&h),
            vec![
                (0, Level::Top),
                (1, Level::Top),
                (0, Level::Middle),
                (1, Level::Middle),
                (1, Level::Bottom),
            ]
        );
        assert_eq!(
            demotions(&h),
            vec![
                (0, Level::Top, Level::Middle),
                (1, Level::Top, Level::Middle),
                (1, Level::Middle, Level::Bottom),
            ]
        );
        // a: 10 + 15, b: 10 + 20 + 10
        assert_eq!(h.core.jobs.get(0).cpu_time, 25);
        assert_eq!(h.core.jobs.get(1).cpu_time, 40);
        assert_eq!(
            h.report_lines(),
            vec!["a,Yes,No,35,35,10,0", "b,Yes,No,65,65,25,10"]
        );
    }

    #[test]
    fn bottom_level_keeps_its_jobs() {
        let mut sim = SimPlatform::new();
        sim.define("hog", SimProgram::exiting(100, 0));
        let mut h = Harness::offline(sim, &["hog"]);
        Mlfq::offline([10, 20, 30], 0).run(&mut h.core).unwrap();

        let levels: Vec<Level> = slice_levels(&h).into_iter().map(|(_, l)| l).collect();
        assert_eq!(
            levels,
            vec![
                Level::Top,
                Level::Middle,
                Level::Bottom,
                Level::Bottom,
                Level::Bottom
            ]
        );
        assert_eq!(demotions(&h).len(), 2);
        assert_eq!(h.core.jobs.get(0).completion_time, Some(100));
    }

    #[test]
    fn boost_returns_starved_jobs_to_the_top() {
        let mut sim = SimPlatform::new();
        sim.define("hog", SimProgram::exiting(500, 0));
        let mut h = Harness::offline(sim, &["hog", "hog"]);
        Mlfq::offline([10, 20, 40], 100).run(&mut h.core).unwrap();

        let boosts: Vec<(Millis, Vec<JobId>)> = h
            .core
            .events()
            .iter()
            .filter_map(|event| match event {
                SchedEvent::Boosted { at, moved } => Some((*at, moved.clone())),
                _ => None,
            })
            .collect();
        // Top until 20, middle until 60, one bottom slice until 100.
        assert_eq!(boosts[0], (100, vec![1, 0]));

        let levels = slice_levels(&h);
        assert_eq!(levels[4], (0, Level::Bottom));
        assert_eq!(levels[5], (1, Level::Top));
        assert_eq!(levels[6], (0, Level::Top));
        assert!(h.core.jobs.all_terminal());
        assert_eq!(h.core.jobs.get(1).cpu_time, 500);
    }

    #[test]
    fn random_workloads_keep_metric_identities() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let mut sim = SimPlatform::new();
            let commands: Vec<String> = (0..rng.random_range(1..12))
                .map(|i| format!("job{i}"))
                .collect();
            for command in &commands {
                let code = i32::from(rng.random_bool(0.2));
                sim.define(command, SimProgram::exiting(rng.random_range(0..300), code));
            }
            let names: Vec<&str> = commands.iter().map(String::as_str).collect();
            let mut h = Harness::offline(sim, &names);
            let boost = rng.random_range(0..150);
            Mlfq::offline([10, 25, 50], boost).run(&mut h.core).unwrap();

            assert!(h.core.jobs.all_terminal());
            let total: Millis = h.core.jobs.iter().map(|job| job.cpu_time).sum();
            assert_eq!(h.core.platform.now(), total);
            for job in h.core.jobs.iter() {
                let metrics = job.metrics.unwrap();
                let completion = job.completion_time.unwrap();
                let start = job.start_time.unwrap();
                assert_eq!(metrics.turnaround, completion - job.arrival_time);
                assert_eq!(metrics.waiting, metrics.turnaround - job.cpu_time);
                assert_eq!(metrics.response, start - job.arrival_time);
                assert_eq!(job.cpu_time, h.core.platform.processes()[job.id].program.run_time);
            }
        }
    }

    #[test]
    fn spawn_failure_does_not_stop_the_run() {
        let mut sim = SimPlatform::new();
        sim.fail_spawn("sleep 0.01");
        let mut h = Harness::offline(sim, &["sleep 0.01", "false", "sleep 0.02"]);
        Mlfq::offline([100, 200, 400], 1000).run(&mut h.core).unwrap();

        assert_eq!(
            h.report_lines(),
            vec![
                "sleep 0.01,No,Yes,0,0,0,0",
                "false,Yes,Yes,0,0,0,0",
                "sleep 0.02,Yes,No,20,20,0,0",
            ]
        );
    }

    #[test]
    fn placement_thresholds() {
        let mlfq = Mlfq::online([100, 200, 400], 0);
        assert_eq!(mlfq.placement(None), Level::Middle);
        assert_eq!(mlfq.placement(Some(99.0)), Level::Top);
        assert_eq!(mlfq.placement(Some(100.0)), Level::Middle);
        assert_eq!(mlfq.placement(Some(199.0)), Level::Middle);
        assert_eq!(mlfq.placement(Some(200.0)), Level::Bottom);
    }

    #[test]
    fn online_placement_follows_history() {
        let mut history = CommandHistory::new();
        history.record_burst("sleep 0.05", 50);
        history.record_burst("sleep 0.3", 300);
        let mut h = Harness::new(SimPlatform::new())
            .map(|core| core.with_history(history))
            .drained("sleep 0.05\nsleep 0.3\nsleep 0.15\n");
        Mlfq::online([100, 200, 400], 0).run(&mut h.core).unwrap();

        let placed: Vec<(JobId, Level)> = h
            .core
            .events()
            .iter()
            .filter_map(|event| match *event {
                SchedEvent::Placed { job, level } => Some((job, level)),
                _ => None,
            })
            .collect();
        assert_eq!(
            placed,
            vec![(0, Level::Top), (1, Level::Bottom), (2, Level::Middle)]
        );
        // Strict priority: top, then middle, then bottom.
        assert_eq!(h.slice_order(), vec![0, 2, 1]);
        assert!(h.core.jobs.all_terminal());
    }

    #[test]
    fn online_records_successful_final_slices() {
        let mut sim = SimPlatform::new();
        sim.define("ok", SimProgram::exiting(150, 0))
            .define("bad", SimProgram::exiting(30, 2));
        let mut h = Harness::new(sim).drained("ok\nbad\n");
        Mlfq::online([100, 200, 400], 0).run(&mut h.core).unwrap();

        // No history, so "ok" starts in the middle and fits its quantum.
        let ok = h.core.history.lookup("ok").unwrap();
        assert_eq!(h.core.history.stats(ok).unwrap().count(), 1);
        assert_eq!(h.core.history.average("ok"), Some(150.0));
        assert_eq!(h.core.history.average("bad"), None);
        assert!(h.core.jobs.get(1).error);
    }

    #[test]
    fn late_arrivals_are_measured_from_arrival() {
        let mut sim = SimPlatform::new();
        sim.define("a", SimProgram::exiting(30, 0))
            .define("b", SimProgram::exiting(15, 0))
            .define("c", SimProgram::exiting(25, 0));
        // c is typed only after a's first slice.
        let mut h = Harness::new(sim).typed(&[Some("a\nb\n"), None, Some("c\n")]);
        Mlfq::online([10, 20, 40], 0).run(&mut h.core).unwrap();

        assert_eq!(h.slice_order(), vec![0, 1, 2, 0, 2]);
        let c = h.core.jobs.get(2);
        assert_eq!(c.arrival_time, 20);
        assert_eq!(c.start_time, Some(35));
        assert_eq!(
            h.report_lines(),
            vec!["b,Yes,No,35,35,20,20", "a,Yes,No,65,65,35,0", "c,Yes,No,70,50,25,15"]
        );
        h.assert_metric_identities();
    }

    #[test]
    fn interrupt_kills_unfinished_jobs() {
        let mut sim = SimPlatform::new();
        sim.define("forever", SimProgram::exiting(1_000_000, 0));
        let stop = StopFlag::new();
        let typist = Typist {
            steps: [Some("sleep 0.01\n"), None, None, Some("forever\n")].into(),
            stop: stop.clone(),
        };
        let feed = ArrivalFeed::interactive(Box::new(typist) as Box<dyn Read>);
        let mut h = Harness::new(sim).map(|core| core.with_feed(feed).with_stop(stop));
        Mlfq::online([10, 20, 40], 0).run(&mut h.core).unwrap();

        // Pass 1 runs the sleep, pass 2 idles one tick, pass 3 admits the
        // long job and gives it one middle slice before the interrupt.
        assert_eq!(h.core.jobs.get(0).arrival_time, 0);
        assert_eq!(h.core.jobs.get(1).arrival_time, 11);
        assert_eq!(h.report_lines(), vec!["sleep 0.01,Yes,No,10,10,0,0"]);
        assert!(
            h.core
                .events()
                .contains(&SchedEvent::Orphaned { job: 1 })
        );
        assert!(h.core.jobs.all_terminal());
        assert!(h.core.platform.running().next().is_none());
        assert_eq!(h.core.summary().completed, 1);
    }
}
