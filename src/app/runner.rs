//! Single-kernel and replica-exchange runs, end to end.

use crate::app::setup::{build_simulation, restore_simulation};
use crate::engine::{ReplexEngine, ShutdownManager};
use anyhow::{Context, Result};
use eventide_core::config::RunConfig;
use eventide_core::{Simulation, StopReason};
use eventide_io::{load_snapshot, save_replicas, save_snapshot, timestamp, ReplexReport, RunReport};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Output locations and restart source of a run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Snapshot file (single run) or directory (replica exchange) to write.
    pub snapshot: Option<PathBuf>,
    pub report: Option<PathBuf>,
    /// Snapshot file or directory to start from instead of packing.
    pub restore: Option<PathBuf>,
    /// Wall-clock cadence of replica-exchange status peeks.
    pub peek_every: Option<Duration>,
}

fn stop_reason_str(reason: StopReason) -> &'static str {
    match reason {
        StopReason::EventLimit => "event-limit",
        StopReason::TimeReached => "time-reached",
        StopReason::Exhausted => "exhausted",
        StopReason::Shutdown => "shutdown",
    }
}

fn run_report(sim: &Simulation, fingerprint: &str, stop_reason: &str) -> RunReport {
    RunReport {
        generated_at: timestamp(),
        fingerprint: fingerprint.to_string(),
        status: sim.status().to_string(),
        stop_reason: stop_reason.to_string(),
        time: sim.time(),
        events: sim.event_count(),
        kinetic_energy: sim.kinetic_energy(),
        internal_energy: sim.internal_energy(),
        captures: sim.ledger().len(),
        resting: sim.resting_count(),
        plugins: sim.plugin_summaries(),
    }
}

/// Runs one kernel to its configured end.
///
/// The report is written even when the kernel aborts.
pub fn run_single(
    config: &RunConfig,
    options: &RunOptions,
    shutdown: &ShutdownManager,
) -> Result<RunReport> {
    let fingerprint = config.fingerprint();
    tracing::info!(fingerprint = %fingerprint, "Starting single run");

    let mut sim = match &options.restore {
        Some(path) => {
            let snapshot = load_snapshot(path)
                .with_context(|| format!("restoring from {}", path.display()))?;
            restore_simulation(config, snapshot, 0)
        }
        None => build_simulation(config, 0, None)?,
    };
    sim.initialise()?;

    let flag = shutdown.flag();
    let result = sim.run(Some(flag.as_ref()));
    let stop_reason = match &result {
        Ok(reason) => stop_reason_str(*reason),
        Err(_) => "error",
    };
    let report = run_report(&sim, &fingerprint, stop_reason);
    if let Some(path) = &options.report {
        report
            .write(path)
            .with_context(|| format!("writing report {}", path.display()))?;
    }
    let reason = result?;

    let save = reason != StopReason::Shutdown || shutdown.should_save_on_exit();
    if let Some(path) = options.snapshot.as_ref().filter(|_| save) {
        let mut snapshot = sim.snapshot();
        snapshot.fingerprint = Some(fingerprint.clone());
        save_snapshot(&snapshot, path)
            .with_context(|| format!("writing snapshot {}", path.display()))?;
    }

    tracing::info!(
        reason = ?reason,
        time = sim.time(),
        events = sim.event_count(),
        kinetic_energy = sim.kinetic_energy(),
        internal_energy = sim.internal_energy(),
        "Run finished"
    );
    Ok(report)
}

/// `report.json` peeks into `report.peek.json`.
fn peek_path(report: &Path) -> PathBuf {
    report.with_extension("peek.json")
}

/// Raises the peek flag every `every` of wall time until `done` is set.
fn spawn_peeker(every: Duration, peek: Arc<AtomicBool>, done: Arc<AtomicBool>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let step = every.min(Duration::from_millis(50));
        let mut last = Instant::now();
        while !done.load(Ordering::Acquire) {
            std::thread::sleep(step);
            if last.elapsed() >= every {
                peek.store(true, Ordering::Release);
                last = Instant::now();
            }
        }
    })
}

/// Runs the replica-exchange ladder described by `config.replex`.
pub fn run_replex(
    config: &RunConfig,
    options: &RunOptions,
    shutdown: &ShutdownManager,
) -> Result<ReplexReport> {
    let fingerprint = config.fingerprint();
    let mut temperatures = config.replex.temperatures.clone();
    temperatures.sort_by(f64::total_cmp);
    tracing::info!(
        fingerprint = %fingerprint,
        replicas = temperatures.len(),
        "Starting replica exchange run"
    );

    let sims = temperatures
        .iter()
        .enumerate()
        .map(|(slot, &t)| match &options.restore {
            Some(dir) => {
                let path = dir.join(format!("replica_{slot}.json.gz"));
                let snapshot = load_snapshot(&path)
                    .with_context(|| format!("restoring replica {slot}"))?;
                Ok(restore_simulation(config, snapshot, slot as u64))
            }
            None => build_simulation(config, slot as u64, Some(t)),
        })
        .collect::<Result<Vec<_>>>()?;

    let mut engine = ReplexEngine::new(sims, &config.replex, config.kernel.seed, shutdown.clone())?
        .with_fingerprint(fingerprint);
    if let Some(path) = &options.report {
        engine = engine.with_peek_output(peek_path(path));
    }
    let done = Arc::new(AtomicBool::new(false));
    let peeker = options
        .peek_every
        .map(|every| spawn_peeker(every, engine.peek_handle(), Arc::clone(&done)));
    let result = engine.run();
    done.store(true, Ordering::Release);
    if let Some(handle) = peeker {
        let _ = handle.join();
    }
    let status = match &result {
        Ok(outcome) => outcome.as_str(),
        Err(_) => "error",
    };

    let report = engine.report(status);
    if let Some(path) = &options.report {
        report
            .write(path)
            .with_context(|| format!("writing report {}", path.display()))?;
    }
    let save = result.is_ok() && (status != "shutdown" || shutdown.should_save_on_exit());
    if let Some(dir) = options.snapshot.as_ref().filter(|_| save) {
        let paths = save_replicas(dir, &engine.snapshots())
            .with_context(|| format!("writing replicas to {}", dir.display()))?;
        tracing::info!(files = paths.len(), dir = %dir.display(), "Replicas saved");
    }
    result?;

    tracing::info!(
        round_trips = report.round_trips,
        acceptance = report.overall_acceptance(),
        "Replica exchange finished"
    );
    Ok(report)
}
