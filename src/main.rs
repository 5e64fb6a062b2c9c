use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use eventide_core::config::{RunConfig, SwapMode};
use eventide_lib::app::{geometric_ladder, run_replex, run_single, RunOptions};
use eventide_lib::engine::ShutdownManager;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Event-driven particle simulator", long_about = None)]
struct Cli {
    /// Run configuration file
    #[arg(short, long, global = true, default_value = "run.toml")]
    config: PathBuf,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the final report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single simulation
    Run(CommonArgs),
    /// Run a replica-exchange ladder
    Replex(ReplexArgs),
}

#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Stop after this many events
    #[arg(short, long)]
    events: Option<u64>,

    /// Stop at this simulated time
    #[arg(short, long)]
    time: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Events between progress lines
    #[arg(long)]
    print_interval: Option<u64>,

    /// Where to write the final state
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Where to write the JSON report
    #[arg(long)]
    report: Option<PathBuf>,

    /// Start from a saved state
    #[arg(long)]
    restore: Option<PathBuf>,

    /// Skip the snapshot when interrupted
    #[arg(long)]
    no_save_on_exit: bool,
}

#[derive(Args, Debug)]
struct ReplexArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Replica count; builds a geometric ladder over the configured range
    #[arg(short = 'n', long)]
    replicas: Option<usize>,

    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Worker threads, 0 for one per core
    #[arg(long)]
    threads: Option<usize>,

    /// Simulated time between swap phases
    #[arg(long)]
    slice_time: Option<f64>,

    /// Number of swap phases
    #[arg(long)]
    slices: Option<u64>,

    /// Log status and write a peek report every this many wall-clock seconds
    #[arg(long)]
    peek_every: Option<f64>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Mode {
    None,
    Alternating,
    Single,
    Random,
    Selection,
}

impl From<Mode> for SwapMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::None => SwapMode::NoSwapping,
            Mode::Alternating => SwapMode::AlternatingSequence,
            Mode::Single => SwapMode::SinglePair,
            Mode::Random => SwapMode::RandomPairs,
            Mode::Selection => SwapMode::RandomSelection,
        }
    }
}

impl CommonArgs {
    fn apply(&self, config: &mut RunConfig) {
        if let Some(events) = self.events {
            config.kernel.max_events = Some(events);
        }
        if let Some(time) = self.time {
            config.kernel.end_time = Some(time);
        }
        if let Some(seed) = self.seed {
            config.kernel.seed = seed;
        }
        if let Some(interval) = self.print_interval {
            config.kernel.print_interval = interval;
        }
    }

    fn options(&self) -> RunOptions {
        RunOptions {
            snapshot: self.snapshot.clone(),
            report: self.report.clone(),
            restore: self.restore.clone(),
            peek_every: None,
        }
    }
}

impl ReplexArgs {
    fn options(&self) -> RunOptions {
        RunOptions {
            peek_every: self
                .peek_every
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .map(Duration::from_secs_f64),
            ..self.common.options()
        }
    }

    fn apply(&self, config: &mut RunConfig) {
        self.common.apply(config);
        if let Some(n) = self.replicas {
            let ladder = &config.replex.temperatures;
            let min = ladder.iter().copied().fold(f64::INFINITY, f64::min);
            let max = ladder.iter().copied().fold(0.0, f64::max);
            config.replex.temperatures = geometric_ladder(min, max, n);
        }
        if let Some(mode) = self.mode {
            config.replex.mode = mode.into();
        }
        if let Some(threads) = self.threads {
            config.replex.threads = threads;
        }
        if let Some(slice_time) = self.slice_time {
            config.replex.slice_time = slice_time;
        }
        if let Some(slices) = self.slices {
            config.replex.slices = Some(slices);
        }
    }
}

fn execute(cli: &Cli, shutdown: &mut ShutdownManager) -> Result<()> {
    let mut config = RunConfig::load(&cli.config)?;
    let common = match &cli.command {
        Command::Run(args) => {
            args.apply(&mut config);
            args
        }
        Command::Replex(args) => {
            args.apply(&mut config);
            &args.common
        }
    };
    config.validate()?;
    shutdown.set_save_on_exit(!common.no_save_on_exit);
    shutdown.install_signal_handler()?;

    match &cli.command {
        Command::Run(args) => {
            let report = run_single(&config, &args.options(), shutdown)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            println!(
                "{}: t = {:.6}, {} events, KE = {:.6}",
                report.stop_reason, report.time, report.events, report.kinetic_energy
            );
        }
        Command::Replex(args) => {
            let report = run_replex(&config, &args.options(), shutdown)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            println!(
                "{}: {} slices, {} round trips, acceptance {:.3}",
                report.status,
                report.slices,
                report.round_trips,
                report.overall_acceptance()
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.verbose {
        eventide_core::init_logging_with(tracing::Level::DEBUG);
    } else {
        eventide_core::init_logging();
    }

    let mut shutdown = ShutdownManager::new();
    if let Err(e) = execute(&cli, &mut shutdown) {
        tracing::error!(error = %e, "Run aborted");
        eprintln!("Error: {e:#}");
        shutdown.set_exit_code(1);
    } else if shutdown.is_shutdown_requested() {
        tracing::info!(
            interrupts = shutdown.interrupts(),
            saved = shutdown.should_save_on_exit(),
            "Stopped early"
        );
    }
    ExitCode::from(shutdown.exit_code() as u8)
}
