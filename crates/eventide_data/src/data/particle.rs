use super::vector::Vec3;
use serde::{Deserialize, Serialize};

/// Stable particle identifier; equal to the particle's index in its replica.
pub type ParticleId = usize;

/// Whether a particle follows its free-flight trajectory or sits at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParticleState {
    #[default]
    Dynamic,
    Resting,
}

/// A single point particle.
///
/// Particles are created when a configuration is loaded and are never
/// destroyed during a run. Only the kernel loop mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub id: ParticleId,
    pub position: Vec3,
    pub velocity: Vec3,
    #[serde(default)]
    pub state: ParticleState,
    /// Index into the species table of the owning simulation.
    pub species: usize,
}

impl Particle {
    pub fn new(id: ParticleId, position: Vec3, velocity: Vec3, species: usize) -> Self {
        Self {
            id,
            position,
            velocity,
            state: ParticleState::Dynamic,
            species,
        }
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.state == ParticleState::Dynamic
    }

    pub fn kinetic_energy(&self, mass: f64) -> f64 {
        0.5 * mass * self.velocity.nrm2()
    }
}

/// Per-species physical constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub name: String,
    pub mass: f64,
}

impl Species {
    pub fn new(name: impl Into<String>, mass: f64) -> Self {
        Self {
            name: name.into(),
            mass,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_particle_is_dynamic() {
        let p = Particle::new(3, Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 0);
        assert!(p.is_dynamic());
        assert_eq!(p.kinetic_energy(2.0), 1.0);
    }

    #[test]
    fn test_state_defaults_when_missing() {
        let json = r#"{"id":0,"position":{"x":0,"y":0,"z":0},"velocity":{"x":0,"y":0,"z":0},"species":0}"#;
        let p: Particle = serde_json::from_str(json).unwrap();
        assert_eq!(p.state, ParticleState::Dynamic);
    }
}
