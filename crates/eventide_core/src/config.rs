//! Configuration management for simulation runs.
//!
//! This module provides strongly-typed configuration structures that map to
//! a `run.toml` file. Every section has defaults, so a file only needs the
//! values it changes.
//!
//! ## Configuration Hierarchy
//!
//! 1. Default values (hardcoded in `Default` impls)
//! 2. `run.toml` file (overrides defaults)
//! 3. Command-line flags (override the file)
//!
//! ## Example `run.toml`
//!
//! ```toml
//! [kernel]
//! end_time = 50.0
//! seed = 7
//!
//! [system]
//! boundary = "periodic"
//! box_size = 12.0
//!
//! [[system.interactions]]
//! name = "Bulk"
//! kind = "square_well"
//! diameter = 1.0
//! lambda = 1.5
//! well_depth = 1.0
//!
//! [packing]
//! particles = 216
//! temperature = 1.2
//!
//! [replex]
//! temperatures = [0.8, 1.0, 1.2, 1.5]
//! mode = "alternating_sequence"
//! ```

use crate::interaction::{HardSphere, Interaction, InteractionKind, InteractionProvider};
use crate::range::{PairRange, ParticleRange};
use crate::systems::{Andersen, SleepSystem};
use eventide_data::Species;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Event loop parameters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    /// Stop after this many events.
    pub max_events: Option<u64>,
    /// Stop once simulated time reaches this value.
    pub end_time: Option<f64>,
    /// Largest negative event delay treated as "now".
    pub reverse_tolerance: f64,
    /// Relative precision used to accept predicted roots.
    pub root_precision: f64,
    /// Events between progress lines.
    pub print_interval: u64,
    /// Abort on initial overlaps instead of warning.
    pub strict_overlaps: bool,
    pub seed: u64,
    /// Simulated time between ticker samples; no ticker when unset.
    pub ticker_period: Option<f64>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_events: None,
            end_time: Some(100.0),
            reverse_tolerance: 1e-10,
            root_precision: 1e-12,
            print_interval: 100_000,
            strict_overlaps: false,
            seed: 42,
            ticker_period: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryKind {
    /// Periodic box with a neighbour cell grid.
    #[default]
    Periodic,
    /// Closed box bounded by six hard walls.
    Walls,
    /// Unbounded space.
    Open,
}

/// Box, species and interactions.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SystemConfig {
    pub boundary: BoundaryKind,
    /// Side of the cubic simulation box.
    pub box_size: f64,
    pub species: Vec<Species>,
    pub interactions: Vec<Interaction>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            boundary: BoundaryKind::Periodic,
            box_size: 10.0,
            species: vec![Species::new("A", 1.0)],
            interactions: vec![Interaction::new(
                "Bulk",
                PairRange::All,
                InteractionKind::HardSphere(HardSphere {
                    diameter: 1.0,
                    elasticity: 1.0,
                }),
            )],
        }
    }
}

/// Initial configuration generator settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PackingConfig {
    pub particles: usize,
    pub temperature: f64,
    pub species: usize,
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            particles: 125,
            temperature: 1.0,
            species: 0,
        }
    }
}

/// How the replica-exchange engine picks pairs to swap.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SwapMode {
    /// Never swap; replicas run independently.
    NoSwapping,
    /// Neighbouring pairs, alternating between even and odd offsets.
    #[default]
    AlternatingSequence,
    /// One random neighbouring pair.
    SinglePair,
    /// `attempt_multiplier * N` random pairs, not necessarily neighbours.
    RandomPairs,
    /// A coin flip between `AlternatingSequence` and `RandomPairs`.
    RandomSelection,
}

/// Replica-exchange settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ReplexConfig {
    pub temperatures: Vec<f64>,
    pub mode: SwapMode,
    /// Simulated time each replica runs between swap phases.
    pub slice_time: f64,
    /// Number of slices; unlimited when unset.
    pub slices: Option<u64>,
    /// Worker threads; zero lets rayon pick.
    pub threads: usize,
    /// Random pairs per replica per phase in `RandomPairs` mode.
    pub attempt_multiplier: usize,
    /// Rescale velocities to the new temperature after a swap.
    pub rescale_velocities: bool,
    /// Events between cooperative shutdown checks inside a slice.
    pub shutdown_check_interval: u64,
}

impl Default for ReplexConfig {
    fn default() -> Self {
        Self {
            temperatures: vec![1.0, 1.25, 1.5, 1.75],
            mode: SwapMode::AlternatingSequence,
            slice_time: 1.0,
            slices: Some(100),
            threads: 0,
            attempt_multiplier: 5,
            rescale_velocities: false,
            shutdown_check_interval: 1_000,
        }
    }
}

/// Top-level run configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct RunConfig {
    pub kernel: KernelConfig,
    pub system: SystemConfig,
    pub packing: PackingConfig,
    pub sleep: Option<SleepSystem>,
    pub thermostat: Option<Andersen>,
    pub replex: ReplexConfig,
}

impl RunConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file, falling back to defaults when it does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Longest interaction distance.
    pub fn max_interaction_distance(&self) -> f64 {
        self.system
            .interactions
            .iter()
            .map(|i| i.kind.max_distance())
            .fold(0.0, f64::max)
    }

    /// Validates all configuration parameters.
    ///
    /// Returns `Ok(())` if all parameters are valid, or `Err` with a description
    /// of the first validation failure.
    pub fn validate(&self) -> anyhow::Result<()> {
        // Kernel validation
        anyhow::ensure!(
            self.kernel.reverse_tolerance >= 0.0,
            "Reverse tolerance must be non-negative"
        );
        anyhow::ensure!(
            self.kernel.root_precision > 0.0 && self.kernel.root_precision < 1e-3,
            "Root precision must be in (0, 1e-3)"
        );
        anyhow::ensure!(self.kernel.print_interval > 0, "Print interval must be positive");
        if let Some(end) = self.kernel.end_time {
            anyhow::ensure!(end >= 0.0, "End time must be non-negative");
        }
        if let Some(period) = self.kernel.ticker_period {
            anyhow::ensure!(period > 0.0, "Ticker period must be positive");
        }

        // System validation
        anyhow::ensure!(self.system.box_size > 0.0, "Box size must be positive");
        anyhow::ensure!(!self.system.species.is_empty(), "At least one species is required");
        for s in &self.system.species {
            anyhow::ensure!(s.mass > 0.0, "Species {} must have positive mass", s.name);
        }
        anyhow::ensure!(
            !self.system.interactions.is_empty(),
            "At least one interaction is required"
        );
        for i in &self.system.interactions {
            anyhow::ensure!(
                i.kind.max_distance() > 0.0,
                "Interaction {} must have a positive range",
                i.name
            );
            for s in i.range.species_refs() {
                anyhow::ensure!(
                    s < self.system.species.len(),
                    "Interaction {} refers to unknown species {}",
                    i.name,
                    s
                );
            }
        }
        if self.system.boundary == BoundaryKind::Periodic {
            anyhow::ensure!(
                self.system.box_size > 2.0 * self.max_interaction_distance(),
                "Periodic box must be wider than twice the interaction range"
            );
        }

        // Packing validation
        anyhow::ensure!(self.packing.particles > 0, "Particle count must be positive");
        anyhow::ensure!(
            self.packing.temperature >= 0.0,
            "Packing temperature must be non-negative"
        );
        anyhow::ensure!(
            self.packing.species < self.system.species.len(),
            "Packing species out of range"
        );

        if let Some(sleep) = &self.sleep {
            anyhow::ensure!(sleep.sleep_velocity > 0.0, "Sleep velocity must be positive");
            if let ParticleRange::Species { species } = sleep.range {
                anyhow::ensure!(
                    species < self.system.species.len(),
                    "Sleep range refers to unknown species"
                );
            }
        }
        if let Some(thermostat) = &self.thermostat {
            anyhow::ensure!(
                thermostat.mean_free_time > 0.0,
                "Thermostat mean free time must be positive"
            );
            anyhow::ensure!(
                thermostat.temperature > 0.0,
                "Thermostat temperature must be positive"
            );
        }

        // Replica exchange validation
        anyhow::ensure!(
            !self.replex.temperatures.is_empty(),
            "Replica exchange needs at least one temperature"
        );
        anyhow::ensure!(
            self.replex.temperatures.iter().all(|t| *t > 0.0 && t.is_finite()),
            "Replica temperatures must be positive"
        );
        anyhow::ensure!(self.replex.slice_time > 0.0, "Slice time must be positive");
        anyhow::ensure!(
            self.replex.attempt_multiplier > 0,
            "Attempt multiplier must be positive"
        );
        anyhow::ensure!(
            self.replex.shutdown_check_interval > 0,
            "Shutdown check interval must be positive"
        );

        Ok(())
    }

    /// Fingerprint of the physics-relevant sections.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(format!("{:?}", self.system).as_bytes());
        hasher.update(format!("{:?}", self.packing).as_bytes());
        hasher.update(format!("{:?}", self.sleep).as_bytes());
        hasher.update(format!("{:?}", self.thermostat).as_bytes());
        hasher.update(self.kernel.seed.to_le_bytes());
        hex::encode(hasher.finalize())
    }
}
