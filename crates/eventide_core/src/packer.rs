//! Initial configuration generator.
//!
//! Places particles on a simple cubic lattice and draws Maxwell-Boltzmann
//! velocities at a target temperature (units with `k_B = 1`).

use crate::error::{KernelError, KernelResult};
use eventide_data::{Particle, Vec3};
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Velocity drawn from the Maxwell-Boltzmann distribution.
///
/// A non-physical temperature or mass yields a zero velocity.
pub fn maxwell_velocity<R: Rng + ?Sized>(rng: &mut R, temperature: f64, mass: f64) -> Vec3 {
    let Ok(normal) = Normal::new(0.0, (temperature / mass).sqrt()) else {
        return Vec3::ZERO;
    };
    Vec3::new(normal.sample(rng), normal.sample(rng), normal.sample(rng))
}

/// Lattice sites for `n` particles filling a box of `size` centred on the origin.
///
/// Returns the sites and the smallest lattice spacing.
pub fn cubic_lattice(n: usize, size: Vec3) -> (Vec<Vec3>, f64) {
    let per_side = (n as f64).cbrt().ceil().max(1.0) as usize;
    let spacing = size / per_side as f64;
    let mut sites = Vec::with_capacity(n);
    'fill: for iz in 0..per_side {
        for iy in 0..per_side {
            for ix in 0..per_side {
                if sites.len() == n {
                    break 'fill;
                }
                sites.push(Vec3::new(
                    -0.5 * size.x + (ix as f64 + 0.5) * spacing.x,
                    -0.5 * size.y + (iy as f64 + 0.5) * spacing.y,
                    -0.5 * size.z + (iz as f64 + 0.5) * spacing.z,
                ));
            }
        }
    }
    let min_spacing = spacing.x.min(spacing.y).min(spacing.z);
    (sites, min_spacing)
}

/// Removes the centre-of-mass velocity.
pub fn zero_momentum(particles: &mut [Particle], mass: impl Fn(&Particle) -> f64) {
    let mut momentum = Vec3::ZERO;
    let mut total = 0.0;
    for p in particles.iter() {
        let m = mass(p);
        momentum += p.velocity * m;
        total += m;
    }
    if total <= 0.0 {
        return;
    }
    let drift = momentum / total;
    for p in particles.iter_mut() {
        p.velocity -= drift;
    }
}

/// Scales velocities so the kinetic temperature is exactly `temperature`.
pub fn rescale_to_temperature(
    particles: &mut [Particle],
    temperature: f64,
    mass: impl Fn(&Particle) -> f64,
) {
    let ke: f64 = particles
        .iter()
        .map(|p| 0.5 * mass(p) * p.velocity.nrm2())
        .sum();
    let target = 1.5 * particles.len() as f64 * temperature;
    if ke <= 0.0 || target <= 0.0 {
        return;
    }
    let factor = (target / ke).sqrt();
    for p in particles.iter_mut() {
        p.velocity = p.velocity * factor;
    }
}

/// Builds `n` particles of one species on a cubic lattice at `temperature`.
///
/// Fails if the lattice spacing would put neighbours closer than `min_spacing`.
pub fn pack<R: Rng + ?Sized>(
    rng: &mut R,
    n: usize,
    size: Vec3,
    min_spacing: f64,
    species: usize,
    mass: f64,
    temperature: f64,
) -> KernelResult<Vec<Particle>> {
    if n == 0 {
        return Err(KernelError::NoParticles);
    }
    let (sites, spacing) = cubic_lattice(n, size);
    if spacing < min_spacing {
        return Err(KernelError::config(format!(
            "{n} particles do not fit: lattice spacing {spacing:.4} < {min_spacing:.4}"
        )));
    }

    let mut particles: Vec<Particle> = sites
        .into_iter()
        .enumerate()
        .map(|(id, r)| Particle::new(id, r, maxwell_velocity(rng, temperature, mass), species))
        .collect();

    if n > 1 {
        zero_momentum(&mut particles, |_| mass);
    }
    rescale_to_temperature(&mut particles, temperature, |_| mass);
    tracing::debug!(particles = n, spacing = spacing, "Packed cubic lattice");
    Ok(particles)
}
