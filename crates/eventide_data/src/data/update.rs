use super::event::Event;
use super::particle::{ParticleId, ParticleState};
use super::vector::Vec3;
use serde::{Deserialize, Serialize};

/// Change applied to one particle by an executed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleDelta {
    pub id: ParticleId,
    pub species: usize,
    pub mass: f64,
    pub old_velocity: Vec3,
    pub new_velocity: Vec3,
    pub old_state: ParticleState,
    pub new_state: ParticleState,
}

impl ParticleDelta {
    pub fn delta_ke(&self) -> f64 {
        0.5 * self.mass * (self.new_velocity.nrm2() - self.old_velocity.nrm2())
    }

    pub fn delta_momentum(&self) -> Vec3 {
        (self.new_velocity - self.old_velocity) * self.mass
    }
}

/// Everything an observer learns about one executed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub event: Event,
    /// Absolute simulation time at which the event was executed.
    pub time: f64,
    pub changes: Vec<ParticleDelta>,
    /// Change in internal (potential) energy caused by the event.
    pub delta_internal: f64,
}

impl EventData {
    pub fn new(event: Event, time: f64) -> Self {
        Self {
            event,
            time,
            changes: Vec::new(),
            delta_internal: 0.0,
        }
    }

    pub fn delta_ke(&self) -> f64 {
        self.changes.iter().map(ParticleDelta::delta_ke).sum()
    }
}
