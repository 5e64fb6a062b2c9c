//! Serializable state of one simulation.
//!
//! A snapshot carries what changes during a run (particles, captures, clock).
//! Interactions, walls and systems come from the run configuration.

use eventide_data::{Particle, ParticleId, Species};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub particles: Vec<Particle>,
    pub species: Vec<Species>,
    pub time: f64,
    pub event_count: u64,
    /// `(a, b, interaction)` for every captured pair.
    pub captures: Vec<(ParticleId, ParticleId, usize)>,
    pub temperature: Option<f64>,
    /// Configuration fingerprint the snapshot was taken under.
    #[serde(default)]
    pub fingerprint: Option<String>,
}

impl Snapshot {
    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    /// Total kinetic energy, looking masses up in the species table.
    pub fn kinetic_energy(&self) -> f64 {
        self.particles
            .iter()
            .map(|p| {
                let mass = self.species.get(p.species).map_or(0.0, |s| s.mass);
                p.kinetic_energy(mass)
            })
            .sum()
    }
}
