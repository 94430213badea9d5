use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use realsched::{
    Platform, SimPlatform, UnixPlatform,
    config::{MlfqConfig, SchedConfig},
    core::{BoxedFeed, CommandHistory, Millis, Reporter, SchedCore},
    feed::{ArrivalFeed, NonBlockingStdin},
    scheduler::{Fcfs, Mlfq, RoundRobin, Scheduler, ShortestJobFirst},
    signal::{StopFlag, install_interrupt_handler},
};
use std::{
    fs::File,
    io::{self, IsTerminal, Read},
    path::{Path, PathBuf},
};

/// Schedule real processes read one command per line from stdin or a file
#[derive(Parser, Debug)]
#[command(name = "realsched", version, long_about = None)]
struct Cli {
    /// TOML file with default tunables
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read commands from this file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Directory the report file is written to
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Exit poll interval while a quantum is running
    #[arg(long)]
    poll_interval_ms: Option<Millis>,

    /// Sleep between passes of an online policy with nothing to run
    #[arg(long)]
    idle_interval_ms: Option<Millis>,

    /// Online policies exit once input ends and every job has finished
    #[arg(long, default_value_t = false)]
    exit_when_drained: bool,

    /// Run against simulated processes on a virtual clock
    #[arg(long, default_value_t = false)]
    simulate: bool,

    #[command(subcommand)]
    policy: Policy,
}

#[derive(Subcommand, Debug)]
enum Policy {
    /// First come, first served (offline)
    Fcfs,
    /// Round robin (offline)
    Rr {
        #[arg(short, long)]
        quantum: Option<Millis>,
    },
    /// Three-level feedback queue (offline)
    Mlfq(MlfqArgs),
    /// Feedback queue placing new jobs by past bursts (online)
    MlfqOnline(MlfqArgs),
    /// Shortest predicted job first (online)
    Sjf {
        /// Number of recent bursts averaged per command
        #[arg(short = 'k', long)]
        window: Option<usize>,
    },
}

impl Policy {
    fn is_online(&self) -> bool {
        matches!(self, Policy::MlfqOnline(_) | Policy::Sjf { .. })
    }
}

#[derive(Args, Debug)]
struct MlfqArgs {
    #[arg(long)]
    q0: Option<Millis>,
    #[arg(long)]
    q1: Option<Millis>,
    #[arg(long)]
    q2: Option<Millis>,
    /// Boost period, 0 disables boosting
    #[arg(long)]
    boost: Option<Millis>,
}

impl MlfqArgs {
    fn apply(&self, mlfq: &mut MlfqConfig) {
        let fields = [
            (self.q0, &mut mlfq.q0_ms),
            (self.q1, &mut mlfq.q1_ms),
            (self.q2, &mut mlfq.q2_ms),
            (self.boost, &mut mlfq.boost_ms),
        ];
        for (arg, field) in fields {
            if let Some(value) = arg {
                *field = value;
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    if cli.simulate {
        warn!("simulating processes; no commands will be executed");
        run_with(&cli, &config, SimPlatform::new())
    } else {
        run_with(&cli, &config, UnixPlatform::new())
    }
}

/// Built-in defaults, then the config file, then command line flags.
fn load_config(cli: &Cli) -> Result<SchedConfig> {
    let mut config = match &cli.config {
        Some(path) => SchedConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SchedConfig::default(),
    };

    if let Some(dir) = &cli.report_dir {
        config.report_dir = dir.clone();
    }
    if let Some(ms) = cli.poll_interval_ms {
        config.poll_interval_ms = ms;
    }
    if let Some(ms) = cli.idle_interval_ms {
        config.idle_interval_ms = ms;
    }
    config.exit_when_drained |= cli.exit_when_drained;

    match &cli.policy {
        Policy::Rr {
            quantum: Some(quantum),
        } => config.quantum_ms = *quantum,
        Policy::Mlfq(args) | Policy::MlfqOnline(args) => args.apply(&mut config.mlfq),
        Policy::Sjf {
            window: Some(window),
        } => config.sjf_window = *window,
        _ => {}
    }

    config.validate()?;
    Ok(config)
}

fn run_with<P: Platform>(cli: &Cli, config: &SchedConfig, platform: P) -> Result<()> {
    let quanta = config.mlfq.quanta();
    let boost = config.mlfq.boost_ms;
    match cli.policy {
        Policy::Fcfs => execute(cli, config, platform, Fcfs),
        Policy::Rr { .. } => execute(cli, config, platform, RoundRobin::new(config.quantum_ms)),
        Policy::Mlfq(_) => execute(cli, config, platform, Mlfq::offline(quanta, boost)),
        Policy::MlfqOnline(_) => execute(cli, config, platform, Mlfq::online(quanta, boost)),
        Policy::Sjf { .. } => execute(
            cli,
            config,
            platform,
            ShortestJobFirst::new(config.sjf_window),
        ),
    }
}

fn execute<P: Platform, S: Scheduler>(
    cli: &Cli,
    config: &SchedConfig,
    platform: P,
    mut policy: S,
) -> Result<()> {
    let report_path = config.report_dir.join(policy.report_name());
    let reporter = Reporter::create(&report_path)
        .with_context(|| format!("creating report {}", report_path.display()))?;
    let history = CommandHistory::with_default_estimate(config.default_estimate_ms);
    let mut core = SchedCore::new(platform, reporter)
        .with_settings(config.core_settings())
        .with_history(history);

    if cli.policy.is_online() {
        let stop = StopFlag::new();
        install_interrupt_handler(&stop).context("installing SIGINT handler")?;
        let feed = open_feed(cli.input.as_deref(), true)?;
        core = core.with_stop(stop).with_feed(feed);
    } else {
        let mut feed = open_feed(cli.input.as_deref(), false)?;
        for command in feed.poll().context("reading commands")? {
            core.submit(&command);
        }
        info!("{} jobs submitted", core.jobs.len());
    }

    info!("writing report to {}", report_path.display());
    policy
        .run(&mut core)
        .with_context(|| format!("scheduling into {}", report_path.display()))?;
    info!("{}", core.summary());
    Ok(())
}

/// A terminal is read without blocking so jobs can be typed while others
/// run. Files and pipes are read whole.
fn open_feed(path: Option<&Path>, allow_interactive: bool) -> Result<BoxedFeed> {
    if let Some(path) = path {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let reader: Box<dyn Read> = Box::new(file);
        return Ok(ArrivalFeed::batch(reader));
    }

    let stdin = io::stdin();
    if allow_interactive && stdin.is_terminal() {
        let reader: Box<dyn Read> =
            Box::new(NonBlockingStdin::new().context("making stdin non-blocking")?);
        Ok(ArrivalFeed::interactive(reader))
    } else {
        let reader: Box<dyn Read> = Box::new(stdin);
        Ok(ArrivalFeed::batch(reader))
    }
}
