use average::{Estimate, Mean};
use std::{
    fmt,
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use super::state::{Millis, ProcessRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Metrics {
    pub turnaround: Millis,
    pub waiting: Millis,
    pub response: Millis,
}

impl Metrics {
    pub fn compute(arrival: Millis, start: Millis, completion: Millis, cpu_time: Millis) -> Self {
        let turnaround = completion.saturating_sub(arrival);
        Self {
            turnaround,
            waiting: turnaround.saturating_sub(cpu_time),
            response: start.saturating_sub(arrival),
        }
    }
}

// One report line. The command is written verbatim, commas included.
struct ReportRow<'a>(&'a ProcessRecord);

impl fmt::Display for ReportRow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let job = self.0;
        let metrics = job.metrics.unwrap_or_default();
        write!(
            f,
            "{},{},{},{},{},{},{}",
            job.command,
            yes_no(job.finished),
            yes_no(job.error),
            job.completion_time.unwrap_or_default(),
            metrics.turnaround,
            metrics.waiting,
            metrics.response,
        )
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "Yes" } else { "No" }
}

/// Writes the per-job CSV report and the per-slice progress trace.
pub struct Reporter {
    report: Box<dyn Write>,
    trace: Box<dyn Write>,
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter").finish_non_exhaustive()
    }
}

impl Reporter {
    pub fn new(report: impl Write + 'static, trace: impl Write + 'static) -> Self {
        Self {
            report: Box::new(report),
            trace: Box::new(trace),
        }
    }

    /// Truncates `path` and traces to stdout.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file), io::stdout()))
    }

    pub fn discard() -> Self {
        Self::new(io::sink(), io::sink())
    }

    pub fn slice(&mut self, command: &str, start: Millis, end: Millis) -> io::Result<()> {
        writeln!(self.trace, "{command}, {start}, {end}")?;
        self.trace.flush()
    }

    pub fn record(&mut self, job: &ProcessRecord) -> io::Result<()> {
        writeln!(self.report, "{}", ReportRow(job))?;
        self.report.flush()
    }
}

/// Averages over every job that reached a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RunSummary {
    pub completed: usize,
    pub errors: usize,
    pub turnaround: f64,
    pub waiting: f64,
    pub response: f64,
}

impl RunSummary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ProcessRecord>) -> Self {
        let mut turnaround = Mean::new();
        let mut waiting = Mean::new();
        let mut response = Mean::new();
        let mut errors = 0;

        for (metrics, error) in records
            .into_iter()
            .filter(|job| job.is_terminal())
            .filter_map(|job| job.metrics.map(|metrics| (metrics, job.error)))
        {
            errors += usize::from(error);
            turnaround.add(metrics.turnaround as f64);
            waiting.add(metrics.waiting as f64);
            response.add(metrics.response as f64);
        }

        Self {
            completed: turnaround.len() as usize,
            errors,
            turnaround: turnaround.mean(),
            waiting: waiting.mean(),
            response: response.mean(),
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} jobs ({} errors), avg turnaround {:.2} ms, avg waiting {:.2} ms, avg response {:.2} ms",
            self.completed, self.errors, self.turnaround, self.waiting, self.response
        )
    }
}
