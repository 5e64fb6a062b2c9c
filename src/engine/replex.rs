//! Replica exchange (parallel tempering) over a ladder of kernels.
//!
//! Every simulation stays in place in `sims`; a swap exchanges the
//! `sim_id` held by two temperature slots and retunes both simulations to
//! their new temperatures. Slices run on a dedicated rayon pool and the
//! join of the parallel iterator is the barrier before each swap phase.

use crate::engine::shutdown::ShutdownManager;
use crate::engine::swap::{
    alternating_pairs, random_pairs, single_pair, AcceptanceRule, Metropolis, SwapCandidate,
};
use eventide_core::config::{ReplexConfig, SwapMode};
use eventide_core::{KernelError, RunLimits, Simulation, Snapshot, StopReason};
use eventide_io::{timestamp, ReplexReport, SlotReport};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplexError {
    #[error("replica {replica} failed: {source}")]
    Kernel {
        replica: usize,
        #[source]
        source: KernelError,
    },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("invalid replica-exchange setup: {0}")]
    Config(String),
}

/// One rung of the temperature ladder.
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureSlot {
    pub temperature: f64,
    /// Index into the engine's simulations of the one at this temperature.
    pub sim_id: usize,
    pub attempts: u64,
    pub swaps: u64,
    /// Visits by simulations whose last extreme was the coldest slot.
    pub up_visits: u64,
    /// Visits by simulations whose last extreme was the hottest slot.
    pub down_visits: u64,
}

impl TemperatureSlot {
    fn new(temperature: f64, sim_id: usize) -> Self {
        Self {
            temperature,
            sim_id,
            attempts: 0,
            swaps: 0,
            up_visits: 0,
            down_visits: 0,
        }
    }

    pub fn acceptance(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.swaps as f64 / self.attempts as f64
        }
    }

    pub fn up_fraction(&self) -> f64 {
        let visits = self.up_visits + self.down_visits;
        if visits == 0 {
            0.0
        } else {
            self.up_visits as f64 / visits as f64
        }
    }
}

/// Which end of the ladder a simulation visited last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    None,
    Coldest,
    Hottest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplexOutcome {
    /// The configured number of slices ran.
    Complete,
    /// A shutdown was requested; every replica is suspended between events.
    Shutdown,
}

impl ReplexOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Shutdown => "shutdown",
        }
    }
}

pub struct ReplexEngine {
    sims: Vec<Simulation>,
    slots: Vec<TemperatureSlot>,
    extremes: Vec<Extremum>,
    sim_round_trips: Vec<u64>,
    round_trips: u64,
    config: ReplexConfig,
    rule: Box<dyn AcceptanceRule>,
    rng: ChaCha8Rng,
    pool: rayon::ThreadPool,
    shutdown: ShutdownManager,
    peek: Arc<AtomicBool>,
    last_peek: Option<ReplexReport>,
    peek_output: Option<PathBuf>,
    total_events: AtomicU64,
    swap_rounds: u64,
    slices_done: u64,
    replex_time: f64,
    fingerprint: String,
    started: Instant,
}

impl std::fmt::Debug for ReplexEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplexEngine")
            .field("replicas", &self.sims.len())
            .field("mode", &self.config.mode)
            .field("slices_done", &self.slices_done)
            .field("round_trips", &self.round_trips)
            .finish()
    }
}

impl ReplexEngine {
    /// Assigns the sorted ladder to `sims` in order and initialises them.
    pub fn new(
        mut sims: Vec<Simulation>,
        config: &ReplexConfig,
        seed: u64,
        shutdown: ShutdownManager,
    ) -> Result<Self, ReplexError> {
        let mut temperatures = config.temperatures.clone();
        if temperatures.is_empty() {
            return Err(ReplexError::Config("empty temperature ladder".into()));
        }
        if temperatures.len() != sims.len() {
            return Err(ReplexError::Config(format!(
                "{} temperatures for {} simulations",
                temperatures.len(),
                sims.len()
            )));
        }
        if temperatures.iter().any(|t| !t.is_finite() || *t <= 0.0) {
            return Err(ReplexError::Config(
                "temperatures must be positive and finite".into(),
            ));
        }
        if !(config.slice_time > 0.0) || !config.slice_time.is_finite() {
            return Err(ReplexError::Config(format!(
                "invalid slice time {}",
                config.slice_time
            )));
        }
        temperatures.sort_by(f64::total_cmp);

        for (replica, (sim, &t)) in sims.iter_mut().zip(&temperatures).enumerate() {
            sim.set_temperature(t);
            sim.initialise()
                .map_err(|source| ReplexError::Kernel { replica, source })?;
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("replica-{}", i))
            .build()
            .map_err(|e| ReplexError::ThreadPool(e.to_string()))?;

        let n = sims.len();
        let slots = temperatures
            .iter()
            .enumerate()
            .map(|(id, &t)| TemperatureSlot::new(t, id))
            .collect();
        let mut extremes = vec![Extremum::None; n];
        if n > 1 {
            extremes[0] = Extremum::Coldest;
            extremes[n - 1] = Extremum::Hottest;
        }

        Ok(Self {
            sims,
            slots,
            extremes,
            sim_round_trips: vec![0; n],
            round_trips: 0,
            config: config.clone(),
            rule: Box::new(Metropolis::new(config.rescale_velocities)),
            rng: ChaCha8Rng::seed_from_u64(seed),
            pool,
            shutdown,
            peek: Arc::new(AtomicBool::new(false)),
            last_peek: None,
            peek_output: None,
            total_events: AtomicU64::new(0),
            swap_rounds: 0,
            slices_done: 0,
            replex_time: 0.0,
            fingerprint: String::new(),
            started: Instant::now(),
        })
    }

    pub fn with_rule(mut self, rule: Box<dyn AcceptanceRule>) -> Self {
        self.rule = rule;
        self
    }

    /// File that receives the report each time a peek is served.
    pub fn with_peek_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.peek_output = Some(path.into());
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = fingerprint.into();
        self
    }

    /// Alternates slices and swap phases until the slice budget is spent
    /// or a shutdown is requested.
    pub fn run(&mut self) -> Result<ReplexOutcome, ReplexError> {
        tracing::info!(
            replicas = self.sims.len(),
            mode = ?self.config.mode,
            rule = self.rule.name(),
            slice_time = self.config.slice_time,
            slices = ?self.config.slices,
            threads = self.pool.current_num_threads(),
            "Starting replica exchange"
        );
        self.started = Instant::now();

        let outcome = loop {
            if self.config.slices.is_some_and(|max| self.slices_done >= max) {
                break ReplexOutcome::Complete;
            }
            if self.shutdown.is_shutdown_requested() {
                break ReplexOutcome::Shutdown;
            }
            if self.run_slice()? == ReplexOutcome::Shutdown {
                break ReplexOutcome::Shutdown;
            }
            self.replex_swap(self.config.mode)?;
            self.update_visits();
            self.slices_done += 1;
            self.replex_time += self.config.slice_time;

            if self.peek.swap(false, Ordering::AcqRel) {
                self.serve_peek();
            }
        };

        if outcome == ReplexOutcome::Shutdown {
            tracing::warn!(
                slices = self.slices_done,
                "Replica exchange stopped by shutdown request"
            );
        }
        self.print_status();
        Ok(outcome)
    }

    /// Advances every replica by one slice in parallel.
    pub fn run_slice(&mut self) -> Result<ReplexOutcome, ReplexError> {
        let flag = self.shutdown.flag();
        let slice_time = self.config.slice_time;
        let check_interval = self.config.shutdown_check_interval;
        let total_events = &self.total_events;
        let sims = &mut self.sims;

        let results: Vec<_> = self.pool.install(|| {
            sims.par_iter_mut()
                .enumerate()
                .map(|(replica, sim)| {
                    let before = sim.event_count();
                    let limits = RunLimits {
                        end_time: Some(sim.time() + slice_time),
                        max_events: None,
                        check_interval,
                    };
                    let result = sim.run_until(limits, Some(flag.as_ref()));
                    total_events.fetch_add(sim.event_count() - before, Ordering::Relaxed);
                    (replica, result)
                })
                .collect()
        });

        let mut shutdown = false;
        for (replica, result) in results {
            match result {
                Ok(StopReason::Shutdown) => shutdown = true,
                Ok(_) => {}
                Err(source) => {
                    tracing::error!(replica, error = %source, "Replica failed");
                    self.shutdown.request_shutdown();
                    self.print_status();
                    return Err(ReplexError::Kernel { replica, source });
                }
            }
        }
        Ok(if shutdown {
            ReplexOutcome::Shutdown
        } else {
            ReplexOutcome::Complete
        })
    }

    /// Runs one swap phase.
    pub fn replex_swap(&mut self, mode: SwapMode) -> Result<(), ReplexError> {
        let n = self.slots.len();
        let mode = match mode {
            SwapMode::RandomSelection if self.rng.gen_bool(0.5) => SwapMode::AlternatingSequence,
            SwapMode::RandomSelection => SwapMode::RandomPairs,
            other => other,
        };
        let pairs = match mode {
            SwapMode::NoSwapping => Vec::new(),
            SwapMode::AlternatingSequence => alternating_pairs(n, self.swap_rounds % 2 == 1),
            SwapMode::SinglePair => single_pair(&mut self.rng, n).into_iter().collect(),
            SwapMode::RandomPairs | SwapMode::RandomSelection => {
                random_pairs(&mut self.rng, n, self.config.attempt_multiplier * n)
            }
        };
        self.swap_rounds += 1;

        for (i, j) in pairs {
            self.attempt(i, j)?;
        }
        Ok(())
    }

    fn candidate(&self, slot: usize) -> SwapCandidate {
        let sim = &self.sims[self.slots[slot].sim_id];
        SwapCandidate {
            temperature: self.slots[slot].temperature,
            total_energy: sim.total_energy(),
            internal_energy: sim.internal_energy(),
        }
    }

    /// Proposes exchanging the configurations of slots `i` and `j`.
    pub fn attempt(&mut self, i: usize, j: usize) -> Result<bool, ReplexError> {
        let a = self.candidate(i);
        let b = self.candidate(j);
        self.slots[i].attempts += 1;
        self.slots[j].attempts += 1;

        if !self.rule.accept(&a, &b, &mut self.rng) {
            return Ok(false);
        }

        let sim_i = self.slots[i].sim_id;
        let sim_j = self.slots[j].sim_id;
        self.slots[i].sim_id = sim_j;
        self.slots[j].sim_id = sim_i;
        self.slots[i].swaps += 1;
        self.slots[j].swaps += 1;

        self.retemper(sim_j, a.temperature, b.temperature)?;
        self.retemper(sim_i, b.temperature, a.temperature)?;
        tracing::trace!(slot_a = i, slot_b = j, "Swap accepted");
        Ok(true)
    }

    fn retemper(&mut self, sim_id: usize, new: f64, old: f64) -> Result<(), ReplexError> {
        let sim = &mut self.sims[sim_id];
        sim.set_temperature(new);
        let result = if self.config.rescale_velocities {
            sim.scale_velocities((new / old).sqrt())
        } else {
            sim.reset_schedule()
        };
        result.map_err(|source| ReplexError::Kernel {
            replica: sim_id,
            source,
        })
    }

    /// Updates extremum records, round trips and per-slot visit counts.
    pub fn update_visits(&mut self) {
        let n = self.slots.len();
        if n > 1 {
            let ends = [
                (self.slots[0].sim_id, Extremum::Coldest),
                (self.slots[n - 1].sim_id, Extremum::Hottest),
            ];
            for (sim_id, end) in ends {
                let last = self.extremes[sim_id];
                if last != Extremum::None && last != end {
                    self.round_trips += 1;
                    self.sim_round_trips[sim_id] += 1;
                }
                self.extremes[sim_id] = end;
            }
        }

        for slot in self.slots.iter_mut() {
            match self.extremes[slot.sim_id] {
                Extremum::Coldest => slot.up_visits += 1,
                Extremum::Hottest => slot.down_visits += 1,
                Extremum::None => {}
            }
        }
    }

    pub fn print_status(&self) {
        for (idx, slot) in self.slots.iter().enumerate() {
            let sim = &self.sims[slot.sim_id];
            tracing::info!(
                slot = idx,
                temperature = slot.temperature,
                replica = slot.sim_id,
                acceptance = slot.acceptance(),
                up_fraction = slot.up_fraction(),
                time = sim.time(),
                events = sim.event_count(),
                "Replica slot"
            );
        }
        tracing::info!(
            slices = self.slices_done,
            replex_time = self.replex_time,
            round_trips = self.round_trips,
            events = self.total_events(),
            elapsed_seconds = self.started.elapsed().as_secs_f64(),
            "Replica exchange status"
        );
    }

    pub fn report(&self, status: &str) -> ReplexReport {
        let slots = self
            .slots
            .iter()
            .map(|slot| {
                let sim = &self.sims[slot.sim_id];
                SlotReport {
                    temperature: slot.temperature,
                    sim_id: slot.sim_id,
                    attempts: slot.attempts,
                    swaps: slot.swaps,
                    acceptance: slot.acceptance(),
                    up_fraction: slot.up_fraction(),
                    time: sim.time(),
                    events: sim.event_count(),
                    kinetic_energy: sim.kinetic_energy(),
                    internal_energy: sim.internal_energy(),
                }
            })
            .collect();
        ReplexReport {
            generated_at: timestamp(),
            fingerprint: self.fingerprint.clone(),
            mode: format!("{:?}", self.config.mode),
            status: status.to_string(),
            slices: self.slices_done,
            replex_time: self.replex_time,
            elapsed_seconds: self.started.elapsed().as_secs_f64(),
            round_trips: self.round_trips,
            sim_round_trips: self.sim_round_trips.clone(),
            slots,
        }
    }

    /// Snapshots ordered coldest first.
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.slots
            .iter()
            .map(|slot| {
                let mut snapshot = self.sims[slot.sim_id].snapshot();
                if !self.fingerprint.is_empty() {
                    snapshot.fingerprint = Some(self.fingerprint.clone());
                }
                snapshot
            })
            .collect()
    }

    // ---- accessors ----

    pub fn slots(&self) -> &[TemperatureSlot] {
        &self.slots
    }

    pub fn sims(&self) -> &[Simulation] {
        &self.sims
    }

    pub fn simulation_at(&self, slot: usize) -> Option<&Simulation> {
        self.slots.get(slot).map(|s| &self.sims[s.sim_id])
    }

    pub fn extremes(&self) -> &[Extremum] {
        &self.extremes
    }

    pub fn round_trips(&self) -> u64 {
        self.round_trips
    }

    pub fn sim_round_trips(&self) -> &[u64] {
        &self.sim_round_trips
    }

    pub fn slices_done(&self) -> u64 {
        self.slices_done
    }

    pub fn replex_time(&self) -> f64 {
        self.replex_time
    }

    pub fn total_events(&self) -> u64 {
        self.total_events.load(Ordering::Relaxed)
    }

    fn serve_peek(&mut self) {
        self.print_status();
        let report = self.report("peek");
        if let Some(path) = &self.peek_output {
            if let Err(e) = report.write(path) {
                tracing::warn!(error = %e, path = %path.display(), "Peek report not written");
            }
        }
        self.last_peek = Some(report);
    }

    /// Flag that asks for a status report at the next slice boundary.
    pub fn peek_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.peek)
    }

    pub fn last_peek(&self) -> Option<&ReplexReport> {
        self.last_peek.as_ref()
    }
}
