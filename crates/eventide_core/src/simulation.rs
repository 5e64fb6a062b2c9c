//! The event kernel: one simulation and its event loop.
//!
//! A [`Simulation`] owns its particles, interactions, walls, systems,
//! capture ledger and schedule. Each step pops the earliest valid event,
//! streams every particle to that time, applies the event and recomputes
//! predictions for whoever it touched.
//!
//! ## Lifecycle
//!
//! ```text
//! Start -> ConfigLoaded -> Initialised -> Production <-> Suspended
//!                                             |
//!                                             v
//!                                           Error
//! ```

use crate::capture::CaptureLedger;
use crate::cells::CellGrid;
use crate::config::KernelConfig;
use crate::dynamics::{effective_velocity, stream_particle, Boundary, PairState};
use crate::error::{KernelError, KernelResult};
use crate::interaction::{CaptureTransition, Interaction, InteractionProvider};
use crate::local::Wall;
use crate::metrics::Metrics;
use crate::observer::{OutputPlugin, PluginContext};
use crate::schedule::Schedule;
use crate::snapshot::Snapshot;
use crate::systems::{Andersen, SleepSystem, System, Ticker};
use eventide_data::{
    Event, EventData, EventKind, EventType, Particle, ParticleDelta, ParticleId, Species, Vec3,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SimStatus {
    Start,
    ConfigLoaded,
    Initialised,
    Production,
    Suspended,
    Error,
}

impl SimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ConfigLoaded => "config-loaded",
            Self::Initialised => "initialised",
            Self::Production => "production",
            Self::Suspended => "suspended",
            Self::Error => "error",
        }
    }

    /// Whether events can be executed.
    pub fn is_runnable(&self) -> bool {
        matches!(self, Self::Initialised | Self::Production | Self::Suspended)
    }
}

impl fmt::Display for SimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a call to [`Simulation::run_until`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EventLimit,
    TimeReached,
    /// Nothing left in the schedule and no end time to stream to.
    Exhausted,
    Shutdown,
}

/// Termination conditions for one call to [`Simulation::run_until`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunLimits {
    /// Absolute simulated time to stop at.
    pub end_time: Option<f64>,
    /// Absolute event count to stop at.
    pub max_events: Option<u64>,
    /// Events between checks of the shutdown flag.
    pub check_interval: u64,
}

impl RunLimits {
    pub fn until(end_time: f64) -> Self {
        Self {
            end_time: Some(end_time),
            max_events: None,
            check_interval: 1000,
        }
    }

    pub fn events(max_events: u64) -> Self {
        Self {
            end_time: None,
            max_events: Some(max_events),
            check_interval: 1000,
        }
    }
}

/// Assembles a [`Simulation`].
///
/// Nothing is validated here; [`Simulation::initialise`] does that.
pub struct SimulationBuilder {
    particles: Vec<Particle>,
    species: Vec<Species>,
    interactions: Vec<Interaction>,
    walls: Vec<Wall>,
    boundary: Boundary,
    cell_grid: bool,
    cell_region: Option<Vec3>,
    systems: Vec<System>,
    plugins: Vec<Box<dyn OutputPlugin>>,
    config: KernelConfig,
    replica: u64,
    temperature: Option<f64>,
    time: f64,
    event_count: u64,
    captures: Option<CaptureLedger>,
}

impl Default for SimulationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationBuilder {
    pub fn new() -> Self {
        Self {
            particles: Vec::new(),
            species: Vec::new(),
            interactions: Vec::new(),
            walls: Vec::new(),
            boundary: Boundary::Open,
            cell_grid: true,
            cell_region: None,
            systems: Vec::new(),
            plugins: Vec::new(),
            config: KernelConfig::default(),
            replica: 0,
            temperature: None,
            time: 0.0,
            event_count: 0,
            captures: None,
        }
    }

    pub fn particles(mut self, particles: Vec<Particle>) -> Self {
        self.particles = particles;
        self
    }

    pub fn particle(mut self, particle: Particle) -> Self {
        self.particles.push(particle);
        self
    }

    pub fn species(mut self, species: Species) -> Self {
        self.species.push(species);
        self
    }

    pub fn interaction(mut self, interaction: Interaction) -> Self {
        self.interactions.push(interaction);
        self
    }

    pub fn wall(mut self, wall: Wall) -> Self {
        self.walls.push(wall);
        self
    }

    pub fn walls<I: IntoIterator<Item = Wall>>(mut self, walls: I) -> Self {
        self.walls.extend(walls);
        self
    }

    pub fn boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Use a neighbour cell grid (on by default).
    pub fn cell_grid(mut self, enabled: bool) -> Self {
        self.cell_grid = enabled;
        self
    }

    /// Box the walls enclose, so an open boundary still gets a bounded cell grid.
    pub fn cell_region(mut self, size: Vec3) -> Self {
        self.cell_region = Some(size);
        self
    }

    pub fn sleep(mut self, sleep: SleepSystem) -> Self {
        self.systems.push(System::Sleep(sleep));
        self
    }

    pub fn thermostat(mut self, thermostat: Andersen) -> Self {
        self.temperature.get_or_insert(thermostat.temperature);
        self.systems.push(System::Thermostat(thermostat));
        self
    }

    pub fn ticker(mut self, period: f64) -> Self {
        self.systems.push(System::Ticker(Ticker::new(period)));
        self
    }

    pub fn plugin(mut self, plugin: Box<dyn OutputPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Offsets the random stream so replicas sharing a seed diverge.
    pub fn replica(mut self, replica: u64) -> Self {
        self.replica = replica;
        self
    }

    /// Temperature the simulation is assigned to (replica exchange, thermostat).
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Starts from a saved state instead of fresh particles.
    pub fn restore(mut self, snapshot: Snapshot) -> Self {
        self.particles = snapshot.particles;
        self.species = snapshot.species;
        self.time = snapshot.time;
        self.event_count = snapshot.event_count;
        self.captures = Some(CaptureLedger::from_entries(snapshot.captures));
        if let Some(t) = snapshot.temperature {
            self.temperature = Some(t);
        }
        self
    }

    pub fn build(self) -> Simulation {
        let n = self.particles.len();
        let systems = self.systems.len();
        Simulation {
            status: SimStatus::ConfigLoaded,
            rng: ChaCha8Rng::seed_from_u64(self.config.seed.wrapping_add(self.replica)),
            metrics: Metrics::new(self.config.print_interval),
            config: self.config,
            particles: self.particles,
            species: self.species,
            interactions: self.interactions,
            walls: self.walls,
            boundary: self.boundary,
            use_cells: self.cell_grid,
            cell_region: self.cell_region,
            cells: None,
            systems: self.systems,
            plugins: self.plugins,
            captures_restored: self.captures.is_some(),
            ledger: self.captures.unwrap_or_default(),
            schedule: Schedule::new(n, systems),
            time: self.time,
            event_count: self.event_count,
            kinetic_energy: 0.0,
            internal_energy: 0.0,
            temperature: self.temperature,
            neighbour_buf: Vec::new(),
        }
    }
}

pub struct Simulation {
    status: SimStatus,
    config: KernelConfig,
    particles: Vec<Particle>,
    species: Vec<Species>,
    interactions: Vec<Interaction>,
    walls: Vec<Wall>,
    boundary: Boundary,
    use_cells: bool,
    cell_region: Option<Vec3>,
    cells: Option<CellGrid>,
    systems: Vec<System>,
    plugins: Vec<Box<dyn OutputPlugin>>,
    captures_restored: bool,
    ledger: CaptureLedger,
    schedule: Schedule,
    time: f64,
    event_count: u64,
    kinetic_energy: f64,
    internal_energy: f64,
    temperature: Option<f64>,
    rng: ChaCha8Rng,
    metrics: Metrics,
    neighbour_buf: Vec<ParticleId>,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("status", &self.status)
            .field("time", &self.time)
            .field("event_count", &self.event_count)
            .field("particles", &self.particles.len())
            .field("captures", &self.ledger.len())
            .finish()
    }
}

impl Simulation {
    pub fn builder() -> SimulationBuilder {
        SimulationBuilder::new()
    }

    // ---- lifecycle ----

    /// Validates the setup and builds captures, cells and the schedule.
    ///
    /// Calling it again on an initialised simulation does nothing.
    pub fn initialise(&mut self) -> KernelResult<()> {
        match self.status {
            s if s.is_runnable() => return Ok(()),
            SimStatus::ConfigLoaded => {}
            other => {
                return Err(KernelError::BadState {
                    expected: SimStatus::ConfigLoaded.as_str(),
                    actual: other.as_str(),
                })
            }
        }

        if let Err(e) = self.prepare() {
            self.status = SimStatus::Error;
            tracing::error!(error = %e, "Simulation failed to initialise");
            return Err(e);
        }

        self.recompute_energies();
        self.rebuild_schedule();

        let ctx = PluginContext {
            time: self.time,
            event_count: self.event_count,
            particles: &self.particles,
            species: &self.species,
            kinetic_energy: self.kinetic_energy,
            internal_energy: self.internal_energy,
        };
        for plugin in self.plugins.iter_mut() {
            plugin.initialise(&ctx);
        }

        self.status = SimStatus::Initialised;
        tracing::info!(
            particles = self.particles.len(),
            interactions = self.interactions.len(),
            walls = self.walls.len(),
            systems = self.systems.len(),
            captures = self.ledger.len(),
            cells = self.cells.as_ref().map_or(0, CellGrid::cell_count),
            kinetic_energy = self.kinetic_energy,
            internal_energy = self.internal_energy,
            "Simulation initialised"
        );
        Ok(())
    }

    fn prepare(&mut self) -> KernelResult<()> {
        self.validate_setup()?;

        if let Boundary::Periodic { .. } = self.boundary {
            for p in self.particles.iter_mut() {
                p.position = self.boundary.wrap(p.position);
            }
        }

        let range = self.max_interaction_distance();
        self.cells = match (self.boundary.size(), self.cell_region) {
            _ if !self.use_cells || range <= 0.0 => None,
            (Some(size), _) => Some(CellGrid::new(size, range)?),
            (None, Some(size)) => Some(CellGrid::bounded(size, range)?),
            (None, None) => None,
        };
        if let Some(grid) = self.cells.as_mut() {
            grid.build(&self.particles);
        }

        if self.captures_restored {
            let n = self.particles.len();
            for (a, b, i) in self.ledger.entries() {
                if a >= n || b >= n || i >= self.interactions.len() {
                    return Err(KernelError::config(format!(
                        "restored capture ({a}, {b}) by interaction {i} is out of range"
                    )));
                }
            }
        } else {
            self.initialise_captures();
        }

        self.check_overlaps()
    }

    fn validate_setup(&self) -> KernelResult<()> {
        if self.particles.is_empty() {
            return Err(KernelError::NoParticles);
        }
        if self.species.is_empty() {
            return Err(KernelError::config("no species defined"));
        }
        for s in &self.species {
            if !(s.mass > 0.0) || !s.mass.is_finite() {
                return Err(KernelError::config(format!(
                    "species {} has invalid mass {}",
                    s.name, s.mass
                )));
            }
        }
        for (idx, p) in self.particles.iter().enumerate() {
            if p.id != idx {
                return Err(KernelError::config(format!(
                    "particle at index {idx} carries id {}",
                    p.id
                )));
            }
            if p.species >= self.species.len() {
                return Err(KernelError::config(format!(
                    "particle {idx} refers to unknown species {}",
                    p.species
                )));
            }
            if !p.position.is_finite() || !p.velocity.is_finite() {
                return Err(KernelError::config(format!(
                    "particle {idx} has a non-finite position or velocity"
                )));
            }
        }
        for interaction in &self.interactions {
            if let Some(bad) = interaction
                .range
                .species_refs()
                .into_iter()
                .find(|&s| s >= self.species.len())
            {
                return Err(KernelError::config(format!(
                    "interaction {} refers to unknown species {bad}",
                    interaction.name
                )));
            }
            let d = interaction.kind.max_distance();
            if !(d >= 0.0) || !d.is_finite() {
                return Err(KernelError::config(format!(
                    "interaction {} has invalid range {d}",
                    interaction.name
                )));
            }
        }
        if let Some(size) = self.boundary.size() {
            let range = self.max_interaction_distance();
            for k in 0..3 {
                if !(size[k] > 0.0) || !size[k].is_finite() {
                    return Err(KernelError::config(format!("invalid box size {}", size[k])));
                }
                if size[k] <= 2.0 * range {
                    return Err(KernelError::config(format!(
                        "periodic box side {} must exceed twice the interaction range {range}",
                        size[k]
                    )));
                }
            }
        }
        for system in &self.systems {
            let ok = match system {
                System::Sleep(s) => s.sleep_velocity >= 0.0,
                System::Thermostat(t) => t.mean_free_time > 0.0 && t.temperature > 0.0,
                System::Ticker(t) => t.period > 0.0,
            };
            if !ok {
                return Err(KernelError::config(format!(
                    "system {} has invalid parameters",
                    system.name()
                )));
            }
        }
        Ok(())
    }

    fn initialise_captures(&mut self) {
        self.ledger.clear();
        let mut buf = std::mem::take(&mut self.neighbour_buf);
        for p in 0..self.particles.len() {
            self.collect_neighbours(p, &mut buf);
            for &q in buf.iter().filter(|&&q| q > p) {
                let Some(idx) = self.interaction_for(p, q) else {
                    continue;
                };
                let kind = &self.interactions[idx].kind;
                if kind.is_capturing() && kind.capture_test(&self.pair_state(p, q)) {
                    self.ledger.capture(p, q, idx);
                }
            }
        }
        self.neighbour_buf = buf;
        tracing::debug!(captures = self.ledger.len(), "Initial captures built");
    }

    fn check_overlaps(&mut self) -> KernelResult<()> {
        let mut buf = std::mem::take(&mut self.neighbour_buf);
        let mut overlaps = 0usize;
        let mut first_error = None;
        'outer: for p in 0..self.particles.len() {
            self.collect_neighbours(p, &mut buf);
            for &q in buf.iter().filter(|&&q| q > p) {
                let Some(idx) = self.interaction_for(p, q) else {
                    continue;
                };
                let pair = self.pair_state(p, q);
                let captured = self.ledger.is_captured(p, q);
                if let Some(limit) = self.interactions[idx].kind.overlap(&pair, captured) {
                    let distance = pair.rij.nrm();
                    if self.config.strict_overlaps {
                        first_error = Some(KernelError::Overlap {
                            particle1: p,
                            particle2: q,
                            distance,
                            limit,
                        });
                        break 'outer;
                    }
                    overlaps += 1;
                    tracing::warn!(
                        particle1 = p,
                        particle2 = q,
                        distance = distance,
                        limit = limit,
                        "Particles overlap"
                    );
                }
            }
        }
        self.neighbour_buf = buf;
        if let Some(e) = first_error {
            return Err(e);
        }
        if overlaps > 0 {
            tracing::warn!(overlaps = overlaps, "Initial configuration has overlapping pairs");
        }
        Ok(())
    }

    fn require_runnable(&self) -> KernelResult<()> {
        if self.status.is_runnable() {
            Ok(())
        } else {
            Err(KernelError::BadState {
                expected: SimStatus::Initialised.as_str(),
                actual: self.status.as_str(),
            })
        }
    }

    fn fail(&mut self, error: KernelError) -> KernelError {
        self.status = SimStatus::Error;
        tracing::error!(time = self.time, events = self.event_count, error = %error, "Kernel stopped");
        error
    }

    // ---- prediction ----

    fn max_interaction_distance(&self) -> f64 {
        self.interactions
            .iter()
            .map(|i| i.kind.max_distance())
            .fold(0.0, f64::max)
    }

    /// First interaction whose range covers the pair.
    pub fn interaction_for(&self, p: ParticleId, q: ParticleId) -> Option<usize> {
        let (a, b) = (&self.particles[p], &self.particles[q]);
        self.interactions.iter().position(|i| i.range.contains(a, b))
    }

    fn sleep_monitors(&self, p: &Particle) -> bool {
        self.systems
            .iter()
            .any(|s| matches!(s, System::Sleep(sleep) if sleep.monitors(p)))
    }

    /// Mass used in collisions: unmonitored resting particles are immovable.
    fn collision_mass(&self, p: &Particle) -> f64 {
        if p.is_dynamic() || self.sleep_monitors(p) {
            self.species[p.species].mass
        } else {
            f64::INFINITY
        }
    }

    fn pair_state(&self, p: ParticleId, q: ParticleId) -> PairState {
        let (a, b) = (&self.particles[p], &self.particles[q]);
        PairState {
            rij: self.boundary.separation(a.position, b.position),
            v1: effective_velocity(a),
            v2: effective_velocity(b),
            m1: self.collision_mass(a),
            m2: self.collision_mass(b),
        }
    }

    /// `(dt, type, interaction, captured)` of the pair's next event.
    fn predict_pair(&self, p: ParticleId, q: ParticleId) -> Option<(f64, EventType, usize, bool)> {
        if !self.particles[p].is_dynamic() && !self.particles[q].is_dynamic() {
            return None;
        }
        let idx = self.interaction_for(p, q)?;
        let captured = self.ledger.is_captured(p, q);
        let pair = self.pair_state(p, q);
        let (dt, event_type) =
            self.interactions[idx]
                .kind
                .predict(&pair, captured, self.config.root_precision)?;
        Some((dt, event_type, idx, captured))
    }

    fn collect_neighbours(&self, p: ParticleId, out: &mut Vec<ParticleId>) {
        match &self.cells {
            Some(grid) => grid.neighbours(p, out),
            None => {
                out.clear();
                out.extend((0..self.particles.len()).filter(|&q| q != p));
            }
        }
    }

    /// Replaces `p`'s pending events with fresh predictions.
    fn recompute(&mut self, p: ParticleId) {
        self.schedule.clear_particle(p);

        let mut buf = std::mem::take(&mut self.neighbour_buf);
        self.collect_neighbours(p, &mut buf);
        for &q in &buf {
            if let Some((dt, event_type, idx, captured)) = self.predict_pair(p, q) {
                self.schedule.push(
                    p,
                    self.time + dt,
                    Event::interaction(dt, event_type, p, q, idx),
                    captured,
                );
            }
        }
        self.neighbour_buf = buf;

        let particle = &self.particles[p];
        for (idx, wall) in self.walls.iter().enumerate() {
            if let Some(dt) = wall.predict(particle) {
                self.schedule.push(
                    p,
                    self.time + dt,
                    Event::single(dt, EventKind::Local, EventType::Wall, p, idx),
                    false,
                );
            }
        }
        if let Some(dt) = self.cells.as_ref().and_then(|g| g.next_crossing(particle)) {
            self.schedule.push(
                p,
                self.time + dt,
                Event::single(dt, EventKind::Global, EventType::Cell, p, 0),
                false,
            );
        }
    }

    fn schedule_systems(&mut self) {
        for idx in 0..self.systems.len() {
            self.schedule_system(idx);
        }
    }

    fn schedule_system(&mut self, idx: usize) {
        let dynamic = self.particles.iter().filter(|p| p.is_dynamic()).count();
        let (delay, event_type) = match &self.systems[idx] {
            System::Sleep(s) if s.has_pending() => (0.0, EventType::Sleep),
            System::Sleep(_) => {
                self.schedule.clear_system(idx);
                return;
            }
            System::Thermostat(t) => (t.next_delay(&mut self.rng, dynamic), EventType::Thermostat),
            System::Ticker(t) => (t.period, EventType::Ticker),
        };
        if delay.is_finite() {
            self.schedule.set_system(
                idx,
                self.time + delay,
                Event::single(delay, EventKind::System, event_type, 0, idx),
            );
        } else {
            self.schedule.clear_system(idx);
        }
    }

    fn rebuild_schedule(&mut self) {
        self.schedule.clear();
        for p in 0..self.particles.len() {
            self.recompute(p);
        }
        self.schedule_systems();
    }

    /// Drops every pending event and predicts from scratch.
    pub fn reset_schedule(&mut self) -> KernelResult<()> {
        self.require_runnable()?;
        self.rebuild_schedule();
        Ok(())
    }

    /// Absolute time of the next event, infinite if the schedule is empty.
    pub fn next_event_time(&mut self) -> f64 {
        self.schedule.next_time()
    }

    /// Earliest pair, wall or cell event found by checking every pair.
    ///
    /// Diagnostic for schedule soundness; systems are not included.
    pub fn brute_force_next_time(&self) -> f64 {
        let n = self.particles.len();
        let mut best = f64::INFINITY;
        for p in 0..n {
            for q in (p + 1)..n {
                if let Some((dt, ..)) = self.predict_pair(p, q) {
                    best = best.min(self.time + dt);
                }
            }
            let particle = &self.particles[p];
            for wall in &self.walls {
                if let Some(dt) = wall.predict(particle) {
                    best = best.min(self.time + dt);
                }
            }
            if let Some(dt) = self.cells.as_ref().and_then(|g| g.next_crossing(particle)) {
                best = best.min(self.time + dt);
            }
        }
        best
    }

    // ---- execution ----

    fn stream_all(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        for p in self.particles.iter_mut() {
            stream_particle(p, dt);
        }
    }

    /// Advances every particle to absolute time `time` without running events.
    pub fn stream_to(&mut self, time: f64) {
        if time > self.time {
            self.stream_all(time - self.time);
            self.time = time;
        }
    }

    /// Executes the earliest event. Returns `None` when the schedule is empty.
    pub fn run_next_event(&mut self) -> KernelResult<Option<Event>> {
        self.require_runnable()?;
        self.status = SimStatus::Production;

        let Some(next) = self.schedule.pop() else {
            return Ok(None);
        };

        let dt = next.time - self.time;
        if dt < -self.config.reverse_tolerance {
            let error = KernelError::ReverseEvent {
                event_type: next.event.event_type,
                particle1: next.event.particle1,
                particle2: next.event.particle2,
                dt,
                time: self.time,
            };
            return Err(self.fail(error));
        }
        if dt > 0.0 {
            self.stream_all(dt);
            self.time = next.time;
        }
        self.event_count += 1;

        let mut event = next.event;
        event.dt = dt;
        let result = match event.kind {
            EventKind::Interaction => self.execute_pair(&mut event, next.captured.unwrap_or(false)),
            EventKind::Local => {
                self.execute_wall(&event);
                Ok(())
            }
            EventKind::Global => {
                self.execute_cell(&event);
                Ok(())
            }
            EventKind::System => {
                self.execute_system(&mut event);
                Ok(())
            }
        };
        if let Err(e) = result {
            return Err(self.fail(e));
        }

        self.metrics.increment_counter(&event.event_type.to_string());
        if self.metrics.record_event(self.time, self.particles.len()) {
            let ctx = PluginContext {
                time: self.time,
                event_count: self.event_count,
                particles: &self.particles,
                species: &self.species,
                kinetic_energy: self.kinetic_energy,
                internal_energy: self.internal_energy,
            };
            for plugin in self.plugins.iter_mut() {
                plugin.periodic_output(&ctx);
            }
        }
        Ok(Some(event))
    }

    fn set_velocity(&mut self, id: ParticleId, velocity: Vec3) -> ParticleDelta {
        let p = &mut self.particles[id];
        let delta = ParticleDelta {
            id,
            species: p.species,
            mass: self.species[p.species].mass,
            old_velocity: p.velocity,
            new_velocity: velocity,
            old_state: p.state,
            new_state: p.state,
        };
        p.velocity = velocity;
        self.kinetic_energy += delta.delta_ke();
        delta
    }

    fn notify(&mut self, data: &EventData) {
        if self.plugins.is_empty() {
            return;
        }
        let ctx = PluginContext {
            time: self.time,
            event_count: self.event_count,
            particles: &self.particles,
            species: &self.species,
            kinetic_energy: self.kinetic_energy,
            internal_energy: self.internal_energy,
        };
        for plugin in self.plugins.iter_mut() {
            plugin.event_update(data, &ctx);
        }
    }

    fn execute_pair(&mut self, event: &mut Event, predicted_captured: bool) -> KernelResult<()> {
        let p = event.particle1;
        let q = event
            .particle2
            .ok_or_else(|| KernelError::config(format!("pair event {event} has no partner")))?;

        if !self.particles[p].is_dynamic() && !self.particles[q].is_dynamic() {
            return Err(KernelError::StaticPair {
                particle1: p,
                particle2: q,
                time: self.time,
            });
        }
        let captured = self.ledger.is_captured(p, q);
        if captured != predicted_captured {
            return Err(KernelError::StaleState {
                event_type: event.event_type,
                particle1: p,
                particle2: q,
                predicted_captured,
                captured,
                time: self.time,
            });
        }

        let pair = self.pair_state(p, q);
        let outcome = self.interactions[event.source]
            .kind
            .execute(event.event_type, &pair);
        event.event_type = outcome.event_type;

        match outcome.transition {
            CaptureTransition::Capture => {
                self.ledger.capture(p, q, event.source);
            }
            CaptureTransition::Release => {
                self.ledger.release(p, q);
            }
            CaptureTransition::None => {}
        }
        self.internal_energy += outcome.delta_internal;

        let mut data = EventData::new(*event, self.time);
        data.delta_internal = outcome.delta_internal;
        data.changes.push(self.set_velocity(p, outcome.v1));
        data.changes.push(self.set_velocity(q, outcome.v2));

        self.observe_sleep(p, q);

        self.schedule.invalidate(p);
        self.schedule.invalidate(q);
        self.recompute(p);
        self.recompute(q);
        self.notify(&data);
        Ok(())
    }

    fn observe_sleep(&mut self, p: ParticleId, q: ParticleId) {
        let (a, b) = (&self.particles[p], &self.particles[q]);
        let (ma, mb) = (self.species[a.species].mass, self.species[b.species].mass);
        for (idx, system) in self.systems.iter_mut().enumerate() {
            if let System::Sleep(sleep) = system {
                sleep.observe_pair(a, ma, b, mb);
                if sleep.has_pending() {
                    self.schedule.set_system(
                        idx,
                        self.time,
                        Event::single(0.0, EventKind::System, EventType::Sleep, p, idx),
                    );
                }
            }
        }
    }

    fn execute_wall(&mut self, event: &Event) {
        let p = event.particle1;
        let velocity = self.walls[event.source].reflect(self.particles[p].velocity);
        let mut data = EventData::new(*event, self.time);
        data.changes.push(self.set_velocity(p, velocity));
        self.schedule.invalidate(p);
        self.recompute(p);
        self.notify(&data);
    }

    fn execute_cell(&mut self, event: &Event) {
        let p = event.particle1;
        if let Some(grid) = self.cells.as_mut() {
            grid.cross(&mut self.particles[p]);
        }
        // The trajectory is unchanged, so partners' predictions stay valid.
        self.recompute(p);
        self.notify(&EventData::new(*event, self.time));
    }

    fn execute_system(&mut self, event: &mut Event) {
        let idx = event.source;
        match self.systems[idx].event_type() {
            EventType::Sleep => self.run_sleep(idx, event),
            EventType::Thermostat => self.run_thermostat(idx, event),
            _ => self.run_ticker(idx),
        }
    }

    fn run_sleep(&mut self, idx: usize, event: &Event) {
        let actions = match &mut self.systems[idx] {
            System::Sleep(sleep) => sleep.take_pending(),
            _ => Vec::new(),
        };

        let mut records = Vec::with_capacity(actions.len());
        for (id, action) in actions {
            let mass = self.species[self.particles[id].species].mass;
            let p = &mut self.particles[id];
            let (old_velocity, old_state) = (p.velocity, p.state);
            let event_type = SleepSystem::apply(p, action, mass);
            let delta = ParticleDelta {
                id,
                species: p.species,
                mass,
                old_velocity,
                new_velocity: p.velocity,
                old_state,
                new_state: p.state,
            };
            self.kinetic_energy += delta.delta_ke();

            let mut data = EventData::new(
                Event::single(event.dt, EventKind::System, event_type, id, idx),
                self.time,
            );
            data.changes.push(delta);
            records.push(data);
        }

        for data in &records {
            self.schedule.invalidate(data.event.particle1);
        }
        for data in &records {
            self.recompute(data.event.particle1);
        }
        for data in &records {
            tracing::trace!(event = %data.event, time = self.time, "Sleep action");
            self.notify(data);
        }
    }

    fn run_thermostat(&mut self, idx: usize, event: &mut Event) {
        let System::Thermostat(thermostat) = &self.systems[idx] else {
            return;
        };
        let thermostat = thermostat.clone();
        let dynamic: Vec<ParticleId> = self
            .particles
            .iter()
            .filter(|p| p.is_dynamic())
            .map(|p| p.id)
            .collect();

        if let Some(id) = thermostat.pick(&mut self.rng, &dynamic) {
            let mass = self.species[self.particles[id].species].mass;
            let velocity = thermostat.resample(&mut self.rng, mass);
            event.particle1 = id;
            let mut data = EventData::new(*event, self.time);
            data.changes.push(self.set_velocity(id, velocity));
            self.schedule.invalidate(id);
            self.recompute(id);
            self.notify(&data);
        }
        self.schedule_system(idx);
    }

    fn run_ticker(&mut self, idx: usize) {
        let ctx = PluginContext {
            time: self.time,
            event_count: self.event_count,
            particles: &self.particles,
            species: &self.species,
            kinetic_energy: self.kinetic_energy,
            internal_energy: self.internal_energy,
        };
        for plugin in self.plugins.iter_mut() {
            plugin.ticker(&ctx);
        }
        self.schedule_system(idx);
    }

    /// Runs under the configured end time and event limit.
    pub fn run(&mut self, shutdown: Option<&AtomicBool>) -> KernelResult<StopReason> {
        let limits = RunLimits {
            end_time: self.config.end_time,
            max_events: self.config.max_events,
            check_interval: 1000,
        };
        self.run_until(limits, shutdown)
    }

    /// Executes events until a limit is hit, then suspends.
    ///
    /// On reaching `end_time` every particle is streamed exactly to it.
    pub fn run_until(
        &mut self,
        limits: RunLimits,
        shutdown: Option<&AtomicBool>,
    ) -> KernelResult<StopReason> {
        self.require_runnable()?;
        let check_interval = limits.check_interval.max(1);
        let mut executed = 0u64;

        let reason = loop {
            if limits.max_events.is_some_and(|max| self.event_count >= max) {
                break StopReason::EventLimit;
            }
            if executed % check_interval == 0
                && shutdown.is_some_and(|flag| flag.load(Ordering::Relaxed))
            {
                break StopReason::Shutdown;
            }

            let next = self.schedule.next_time();
            if let Some(end) = limits.end_time {
                if next > end {
                    self.stream_to(end);
                    break StopReason::TimeReached;
                }
            }
            if !next.is_finite() {
                break StopReason::Exhausted;
            }

            self.run_next_event()?;
            executed += 1;
        };

        self.status = SimStatus::Suspended;
        tracing::debug!(
            reason = ?reason,
            time = self.time,
            events = self.event_count,
            executed = executed,
            "Run suspended"
        );
        Ok(reason)
    }

    // ---- energies and temperature ----

    fn recompute_energies(&mut self) {
        self.kinetic_energy = self
            .particles
            .iter()
            .map(|p| p.kinetic_energy(self.species[p.species].mass))
            .sum();
        self.internal_energy = self
            .interactions
            .iter()
            .enumerate()
            .map(|(idx, i)| i.kind.internal_energy(self.ledger.count(idx)))
            .sum();
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.kinetic_energy
    }

    /// Potential energy held in captured pairs.
    pub fn internal_energy(&self) -> f64 {
        self.internal_energy
    }

    pub fn total_energy(&self) -> f64 {
        self.kinetic_energy + self.internal_energy
    }

    /// `2 KE / (3 N)` with `k_B = 1`.
    pub fn kinetic_temperature(&self) -> f64 {
        2.0 * self.kinetic_energy / (3.0 * self.particles.len().max(1) as f64)
    }

    /// Temperature this simulation is assigned to, if any.
    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    /// Reassigns the temperature, including any thermostat's target.
    pub fn set_temperature(&mut self, temperature: f64) {
        self.temperature = Some(temperature);
        for system in self.systems.iter_mut() {
            if let System::Thermostat(t) = system {
                t.temperature = temperature;
            }
        }
    }

    /// Multiplies every velocity by `factor` and repredicts.
    pub fn scale_velocities(&mut self, factor: f64) -> KernelResult<()> {
        if !(factor > 0.0) || !factor.is_finite() {
            return Err(KernelError::config(format!("invalid velocity scale {factor}")));
        }
        for p in self.particles.iter_mut() {
            p.velocity = p.velocity * factor;
        }
        self.recompute_energies();
        if self.status.is_runnable() {
            self.rebuild_schedule();
        }
        Ok(())
    }

    // ---- accessors ----

    pub fn status(&self) -> SimStatus {
        self.status
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn interactions(&self) -> &[Interaction] {
        &self.interactions
    }

    pub fn walls(&self) -> &[Wall] {
        &self.walls
    }

    pub fn systems(&self) -> &[System] {
        &self.systems
    }

    pub fn boundary(&self) -> Boundary {
        self.boundary
    }

    /// Cells per axis of the neighbour grid, once initialised with one.
    pub fn cell_dims(&self) -> Option<[usize; 3]> {
        self.cells.as_ref().map(CellGrid::dims)
    }

    pub fn ledger(&self) -> &CaptureLedger {
        &self.ledger
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn resting_count(&self) -> usize {
        self.particles.iter().filter(|p| !p.is_dynamic()).count()
    }

    /// Total momentum of dynamic particles.
    pub fn momentum(&self) -> Vec3 {
        self.particles
            .iter()
            .fold(Vec3::ZERO, |acc, p| acc + p.velocity * self.species[p.species].mass)
    }

    /// Summary of every plugin, keyed by plugin name.
    pub fn plugin_summaries(&self) -> Value {
        let ctx = PluginContext {
            time: self.time,
            event_count: self.event_count,
            particles: &self.particles,
            species: &self.species,
            kinetic_energy: self.kinetic_energy,
            internal_energy: self.internal_energy,
        };
        let mut map = Map::new();
        for plugin in &self.plugins {
            map.insert(plugin.name().to_string(), plugin.summary(&ctx));
        }
        Value::Object(map)
    }

    /// Captures the evolving state; positions are folded into the box.
    pub fn snapshot(&self) -> Snapshot {
        let particles = self
            .particles
            .iter()
            .map(|p| {
                let mut p = p.clone();
                p.position = self.boundary.wrap(p.position);
                p
            })
            .collect();
        Snapshot {
            particles,
            species: self.species.clone(),
            time: self.time,
            event_count: self.event_count,
            captures: self.ledger.entries().collect(),
            temperature: self.temperature,
            fingerprint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::{HardSphere, InteractionKind, SquareWell};
    use crate::range::PairRange;
    use eventide_data::ParticleState;

    fn hard_spheres() -> Interaction {
        Interaction::new(
            "Bulk",
            PairRange::All,
            InteractionKind::HardSphere(HardSphere {
                diameter: 1.0,
                elasticity: 1.0,
            }),
        )
    }

    fn head_on() -> Simulation {
        Simulation::builder()
            .species(Species::new("A", 1.0))
            .interaction(hard_spheres())
            .particle(Particle::new(0, Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 0))
            .particle(Particle::new(1, Vec3::new(1.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0), 0))
            .build()
    }

    #[test]
    fn test_run_before_initialise_is_bad_state() {
        let mut sim = head_on();
        assert_eq!(sim.status(), SimStatus::ConfigLoaded);
        let err = sim.run_next_event().unwrap_err();
        assert!(matches!(err, KernelError::BadState { .. }));
    }

    #[test]
    fn test_initialise_is_idempotent() {
        let mut sim = head_on();
        sim.initialise().unwrap();
        let next = sim.next_event_time();
        sim.initialise().unwrap();
        assert_eq!(sim.next_event_time(), next);
        assert_eq!(sim.status(), SimStatus::Initialised);
    }

    #[test]
    fn test_head_on_collision() {
        let mut sim = head_on();
        sim.initialise().unwrap();
        let event = sim.run_next_event().unwrap().unwrap();
        assert_eq!(event.event_type, EventType::Core);
        assert!((sim.time() - 0.5).abs() < 1e-12);
        assert!((sim.particles()[0].velocity.x + 1.0).abs() < 1e-12);
        assert!((sim.particles()[1].velocity.x - 1.0).abs() < 1e-12);
        assert!(sim.run_next_event().unwrap().is_none());
    }

    #[test]
    fn test_no_particles() {
        let mut sim = Simulation::builder()
            .species(Species::new("A", 1.0))
            .interaction(hard_spheres())
            .build();
        assert_eq!(sim.initialise().unwrap_err(), KernelError::NoParticles);
        assert_eq!(sim.status(), SimStatus::Error);
    }

    #[test]
    fn test_unknown_species_rejected() {
        let mut sim = Simulation::builder()
            .species(Species::new("A", 1.0))
            .interaction(hard_spheres())
            .particle(Particle::new(0, Vec3::ZERO, Vec3::ZERO, 3))
            .build();
        assert!(matches!(sim.initialise(), Err(KernelError::Config(_))));
    }

    #[test]
    fn test_strict_overlap_rejected() {
        let config = KernelConfig {
            strict_overlaps: true,
            ..KernelConfig::default()
        };
        let mut sim = Simulation::builder()
            .config(config)
            .species(Species::new("A", 1.0))
            .interaction(hard_spheres())
            .particle(Particle::new(0, Vec3::ZERO, Vec3::ZERO, 0))
            .particle(Particle::new(1, Vec3::new(0.5, 0.0, 0.0), Vec3::ZERO, 0))
            .build();
        assert!(matches!(sim.initialise(), Err(KernelError::Overlap { .. })));
    }

    #[test]
    fn test_initial_captures_and_internal_energy() {
        let well = Interaction::new(
            "Well",
            PairRange::All,
            InteractionKind::SquareWell(SquareWell {
                diameter: 1.0,
                lambda: 1.5,
                well_depth: 2.0,
                elasticity: 1.0,
            }),
        );
        let mut sim = Simulation::builder()
            .species(Species::new("A", 1.0))
            .interaction(well)
            .particle(Particle::new(0, Vec3::ZERO, Vec3::ZERO, 0))
            .particle(Particle::new(1, Vec3::new(1.2, 0.0, 0.0), Vec3::ZERO, 0))
            .particle(Particle::new(2, Vec3::new(5.0, 0.0, 0.0), Vec3::ZERO, 0))
            .build();
        sim.initialise().unwrap();
        assert!(sim.ledger().is_captured(1, 0));
        assert_eq!(sim.ledger().len(), 1);
        assert_eq!(sim.internal_energy(), -2.0);
    }

    #[test]
    fn test_run_until_streams_to_end_time() {
        let mut sim = head_on();
        sim.initialise().unwrap();
        let reason = sim.run_until(RunLimits::until(2.0), None).unwrap();
        assert_eq!(reason, StopReason::TimeReached);
        assert_eq!(sim.time(), 2.0);
        assert_eq!(sim.event_count(), 1);
        assert_eq!(sim.status(), SimStatus::Suspended);
        // Moving apart at speed 1 each from the contact at x = -0.5 / 0.5.
        assert!((sim.particles()[0].position.x + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_shutdown_flag_stops_run() {
        let mut sim = head_on();
        sim.initialise().unwrap();
        let flag = AtomicBool::new(true);
        let reason = sim.run_until(RunLimits::until(10.0), Some(&flag)).unwrap();
        assert_eq!(reason, StopReason::Shutdown);
        assert_eq!(sim.event_count(), 0);
    }

    #[test]
    fn test_scale_velocities_repredicts() {
        let mut sim = head_on();
        sim.initialise().unwrap();
        sim.scale_velocities(2.0).unwrap();
        assert!((sim.next_event_time() - 0.25).abs() < 1e-12);
        assert!((sim.kinetic_energy() - 4.0).abs() < 1e-12);
    }

    fn approaching_well() -> Simulation {
        let well = Interaction::new(
            "Well",
            PairRange::All,
            InteractionKind::SquareWell(SquareWell {
                diameter: 1.0,
                lambda: 1.5,
                well_depth: 1.0,
                elasticity: 1.0,
            }),
        );
        Simulation::builder()
            .species(Species::new("A", 1.0))
            .interaction(well)
            .particle(Particle::new(0, Vec3::new(-2.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 0))
            .particle(Particle::new(1, Vec3::new(2.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0), 0))
            .build()
    }

    #[test]
    fn test_capture_change_behind_schedule_is_stale_state() {
        let mut sim = approaching_well();
        sim.initialise().unwrap();
        // The WellIn entry was predicted for an uncaptured pair.
        sim.ledger.capture(0, 1, 0);

        let err = sim.run_next_event().unwrap_err();
        match &err {
            KernelError::StaleState {
                event_type,
                predicted_captured,
                captured,
                time,
                ..
            } => {
                assert_eq!(*event_type, EventType::WellIn);
                assert!(!predicted_captured);
                assert!(captured);
                assert!((time - 1.25).abs() < 1e-12);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.is_consistency_violation());
        assert_eq!(sim.status(), SimStatus::Error);
    }

    #[test]
    fn test_pair_event_between_resting_particles_is_static_pair() {
        let mut sim = head_on();
        sim.initialise().unwrap();
        for p in sim.particles.iter_mut() {
            p.state = ParticleState::Resting;
        }

        let err = sim.run_next_event().unwrap_err();
        assert!(matches!(err, KernelError::StaticPair { time, .. } if (time - 0.5).abs() < 1e-12));
        assert!(err.to_string().contains("0.5"));
        assert!(matches!(sim.run_next_event(), Err(KernelError::BadState { .. })));
    }
}

