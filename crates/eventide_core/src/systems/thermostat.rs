//! Andersen thermostat: random velocity resampling at exponential intervals.

use crate::packer::maxwell_velocity;
use eventide_data::{ParticleId, Vec3};
use rand::Rng;
use rand_distr::{Distribution, Exp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Andersen {
    /// Mean time between resamplings of any one particle.
    pub mean_free_time: f64,
    pub temperature: f64,
}

impl Andersen {
    pub fn new(mean_free_time: f64, temperature: f64) -> Self {
        Self {
            mean_free_time,
            temperature,
        }
    }

    /// Delay until the next resampling among `dynamic` particles.
    pub fn next_delay<R: Rng + ?Sized>(&self, rng: &mut R, dynamic: usize) -> f64 {
        if dynamic == 0 {
            return f64::INFINITY;
        }
        Exp::new(dynamic as f64 / self.mean_free_time).map_or(f64::INFINITY, |exp| exp.sample(rng))
    }

    /// Picks the particle to resample.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R, dynamic: &[ParticleId]) -> Option<ParticleId> {
        if dynamic.is_empty() {
            return None;
        }
        Some(dynamic[rng.gen_range(0..dynamic.len())])
    }

    pub fn resample<R: Rng + ?Sized>(&self, rng: &mut R, mass: f64) -> Vec3 {
        maxwell_velocity(rng, self.temperature, mass)
    }
}
